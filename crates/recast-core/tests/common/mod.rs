//! Test doubles for the collaborator traits
//!
//! Sources hold a textual "binary" of the form
//! `name;super1,super2;sig1|@marker|sig2#body`. The compiler copies source
//! text verbatim, the inspector parses the header, and the loader derives
//! capabilities from it.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use recast_core::{
    BinaryInspector, Capabilities, CompileError, CompiledUnits, Compiler, Context,
    EnhanceStage, EnhancementPipeline, LoadError, LoadedType, MemoryLocator, PeekError,
    RuntimeLoader, SourceHandle, StageError, UnitLocator, UnitOutline,
};

pub const EXTENSION_BASE: &str = "recast.Extension";
pub const MARKER: &[u8] = b"<enhanced>";

pub fn parse_header(binary: &[u8]) -> Result<UnitOutline, PeekError> {
    let text = std::str::from_utf8(binary).map_err(|e| PeekError::new(e.to_string()))?;
    let header = text.split('#').next().unwrap_or_default();
    let parts: Vec<&str> = header.split(';').collect();
    if parts.len() != 3 {
        return Err(PeekError::new(format!("expected 3 header fields, got {}", parts.len())));
    }
    let list = |s: &str, sep: char| -> Vec<String> {
        s.split(sep)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    };
    Ok(UnitOutline {
        name: parts[0].to_string(),
        supertypes: list(parts[1], ','),
        signatures: list(parts[2], '|'),
    })
}

pub struct HeaderInspector;

impl BinaryInspector for HeaderInspector {
    fn peek(&self, binary: &[u8]) -> Result<UnitOutline, PeekError> {
        parse_header(binary)
    }
}

/// Appends [`MARKER`] to every unit
pub struct MarkerStage;

impl EnhanceStage for MarkerStage {
    fn name(&self) -> &str {
        "marker"
    }

    fn apply(&self, _unit: &str, mut input: Vec<u8>) -> Result<Vec<u8>, StageError> {
        input.extend_from_slice(MARKER);
        Ok(input)
    }
}

/// Fails for every unit whose body contains `!reject`
pub struct RejectStage;

impl EnhanceStage for RejectStage {
    fn name(&self) -> &str {
        "reject"
    }

    fn apply(&self, _unit: &str, input: Vec<u8>) -> Result<Vec<u8>, StageError> {
        if contains(&input, b"!reject") {
            return Err(StageError::new("unsupported construct"));
        }
        Ok(input)
    }
}

/// Parks the first unit that reaches it until the test opens the gate.
/// Later units pass straight through.
pub struct GateStage {
    entered: Mutex<Option<mpsc::Sender<()>>>,
    release: Mutex<Option<mpsc::Receiver<()>>>,
}

/// Test-side handle: wait for a unit to park, then let it go
pub struct Gate {
    entered: mpsc::Receiver<()>,
    release: mpsc::Sender<()>,
}

impl GateStage {
    pub fn new() -> (Self, Gate) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let stage = Self {
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(Some(release_rx)),
        };
        let gate = Gate {
            entered: entered_rx,
            release: release_tx,
        };
        (stage, gate)
    }
}

impl EnhanceStage for GateStage {
    fn name(&self) -> &str {
        "gate"
    }

    fn apply(&self, _unit: &str, input: Vec<u8>) -> Result<Vec<u8>, StageError> {
        let entered = self.entered.lock().unwrap().take();
        let release = self.release.lock().unwrap().take();
        if let (Some(entered), Some(release)) = (entered, release) {
            entered.send(()).unwrap();
            release.recv().unwrap();
        }
        Ok(input)
    }
}

impl Gate {
    pub fn wait_until_parked(&self) {
        self.entered
            .recv_timeout(std::time::Duration::from_secs(10))
            .expect("no unit reached the gate");
    }

    pub fn open(&self) {
        self.release.send(()).unwrap();
    }
}

/// Copies source text into the raw binary; `error@<line>` in the body fails
pub struct SourceCompiler {
    locator: Arc<MemoryLocator>,
    pub invocations: AtomicUsize,
}

impl SourceCompiler {
    pub fn new(locator: Arc<MemoryLocator>) -> Self {
        Self {
            locator,
            invocations: AtomicUsize::new(0),
        }
    }
}

impl Compiler for SourceCompiler {
    fn compile(&self, names: &BTreeSet<String>) -> Result<CompiledUnits, CompileError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let mut out = CompiledUnits::new();
        for name in names {
            let source = self
                .locator
                .resolve(name)
                .ok_or_else(|| CompileError::new(name, "no source"))?;
            let text = source
                .read_text()
                .map_err(|e| CompileError::new(name, e.to_string()))?;
            if let Some(idx) = text.find("error@") {
                let line = text[idx + 6..]
                    .chars()
                    .take_while(char::is_ascii_digit)
                    .collect::<String>()
                    .parse()
                    .unwrap_or(1);
                return Err(CompileError::new(name, "syntax error").at_line(line));
            }
            // `nested:<Suffix>` in the body also emits `<name>$<Suffix>`
            if let Some(idx) = text.find("nested:") {
                let suffix: String = text[idx + 7..]
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric())
                    .collect();
                out.insert(format!("{name}${suffix}"), text.clone().into_bytes());
            }
            out.insert(name.clone(), text.into_bytes());
        }
        Ok(out)
    }
}

/// Loads any binary with a parseable header; a `!noload` body is rejected
#[derive(Default)]
pub struct HeaderLoader {
    pub loads: AtomicUsize,
}

impl RuntimeLoader for HeaderLoader {
    fn load(&self, name: &str, binary: &[u8]) -> Result<LoadedType, LoadError> {
        let handle = self.loads.fetch_add(1, Ordering::SeqCst) as u64;
        if binary.windows(7).any(|w| w == b"!noload") {
            return Err(LoadError::new(name, "verifier rejected binary"));
        }
        let outline = parse_header(binary).map_err(|e| LoadError::new(name, e.to_string()))?;
        let mut capabilities = Capabilities::new();
        for supertype in outline.supertypes {
            capabilities = capabilities.with_supertype(supertype);
        }
        for signature in outline.signatures {
            if let Some(marker) = signature.strip_prefix('@') {
                capabilities = capabilities.with_marker(marker);
            }
        }
        Ok(LoadedType::new(outline.name, handle, capabilities))
    }
}

pub fn pipeline() -> EnhancementPipeline {
    pipeline_with(Vec::new())
}

/// The marker stage followed by `extra`
pub fn pipeline_with(extra: Vec<Arc<dyn EnhanceStage>>) -> EnhancementPipeline {
    EnhancementPipeline::builder(EXTENSION_BASE, Arc::new(HeaderInspector))
        .stage(Arc::new(MarkerStage))
        .stages(extra)
        .build()
}

pub struct Harness {
    pub locator: Arc<MemoryLocator>,
    pub compiler: Arc<SourceCompiler>,
    pub loader: Arc<HeaderLoader>,
    pub context: Context,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_locator(Arc::new(MemoryLocator::new()))
    }

    pub fn with_locator(locator: Arc<MemoryLocator>) -> Self {
        Self::build(locator, pipeline())
    }

    pub fn with_pipeline(pipeline: EnhancementPipeline) -> Self {
        Self::build(Arc::new(MemoryLocator::new()), pipeline)
    }

    fn build(locator: Arc<MemoryLocator>, pipeline: EnhancementPipeline) -> Self {
        let compiler = Arc::new(SourceCompiler::new(locator.clone()));
        let loader = Arc::new(HeaderLoader::default());
        let context = Context::new(
            locator.clone(),
            compiler.clone(),
            loader.clone(),
            Arc::new(pipeline),
        );
        Self {
            locator,
            compiler,
            loader,
            context,
        }
    }
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
