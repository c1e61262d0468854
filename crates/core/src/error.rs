use graphport_ir::{FreeVariableChain, ObjectId, SourceAttribution, SourcePosition};
use graphport_registry::RegistryError;
use serde::Serialize;

use crate::heap::ValueRef;
use crate::pure_mapping::MappingError;

/// One enclosing definition an unresolved chain was reached through.
///
/// `source_file_id` is set when the definition's file already has an id in
/// the registry. A failed walk mints nothing, so a file first seen by the
/// failing walk is known by path alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceFrame {
    pub source_file_id: Option<ObjectId>,
    pub path: String,
    pub line: u32,
}

impl TraceFrame {
    pub fn new(path: &str, line: u32) -> Self {
        TraceFrame {
            source_file_id: None,
            path: path.to_owned(),
            line,
        }
    }

    pub fn in_file(mut self, source_file_id: ObjectId) -> Self {
        self.source_file_id = Some(source_file_id);
        self
    }

    pub fn attribution(&self) -> SourceAttribution {
        SourceAttribution::at(&self.path, SourcePosition::new(self.line, 0))
    }
}

/// A free-variable chain nothing binds.
///
/// The trace starts at the definition that mentions the chain and grows
/// outward: every enclosing definition the failure propagates through adds
/// its own frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "unable to resolve free variable '{chain}' at {}:{}{}",
    .chain.position.line,
    .chain.position.col,
    file_suffix(.trace)
)]
pub struct UnresolvedFreeVariable {
    pub chain: FreeVariableChain,
    pub trace: Vec<TraceFrame>,
}

impl UnresolvedFreeVariable {
    pub fn new(chain: FreeVariableChain) -> Self {
        UnresolvedFreeVariable {
            chain,
            trace: Vec::new(),
        }
    }

    pub fn push_frame(&mut self, frame: TraceFrame) {
        self.trace.push(frame);
    }

    /// The definition that mentions the chain.
    pub fn innermost(&self) -> Option<&TraceFrame> {
        self.trace.first()
    }

    /// Where the chain itself appears.
    pub fn attribution(&self) -> Option<SourceAttribution> {
        let frame = self.innermost()?;
        Some(SourceAttribution::at(&frame.path, self.chain.position))
    }

    /// Trace frames in attribution form, innermost first.
    pub fn attributed_trace(&self) -> Vec<SourceAttribution> {
        self.trace.iter().map(TraceFrame::attribution).collect()
    }
}

fn file_suffix(trace: &[TraceFrame]) -> String {
    trace
        .first()
        .map(|frame| format!(" in {}", frame.path))
        .unwrap_or_default()
}

/// Why a walk stopped.
#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error(transparent)]
    UnresolvedFreeVariable(Box<UnresolvedFreeVariable>),

    /// No decomposition rule, mapping or module path applies.
    #[error("cannot convert a value of type '{type_name}'")]
    Unsupported { type_name: String },

    /// Following pure mappings from a value led back to a mapping already
    /// used for it.
    #[error("pure mappings for a value of type '{type_name}' substitute in a cycle")]
    SubstitutionCycle { type_name: String },

    #[error("no source text for '{path}'")]
    MissingSource { path: String },

    #[error("value {0} does not belong to this heap")]
    DanglingValue(ValueRef),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl From<UnresolvedFreeVariable> for WalkError {
    fn from(err: UnresolvedFreeVariable) -> Self {
        WalkError::UnresolvedFreeVariable(Box::new(err))
    }
}

impl WalkError {
    pub fn unsupported(type_name: &str) -> Self {
        WalkError::Unsupported {
            type_name: type_name.to_owned(),
        }
    }

    /// Add enclosing frames, innermost first, if this is an
    /// unresolved-variable failure.
    pub(crate) fn with_frames(mut self, frames: impl FnOnce() -> Vec<TraceFrame>) -> Self {
        if let WalkError::UnresolvedFreeVariable(err) = &mut self {
            err.trace.extend(frames());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attribution_matches_wire_format() {
        let mut err = UnresolvedFreeVariable::new(FreeVariableChain::new(["x", "y"], 4, 11));
        err.push_frame(TraceFrame::new("/home/me/app.py", 3));
        err.push_frame(TraceFrame::new("/home/me/app.py", 1));

        let attribution = serde_json::to_value(err.attribution().unwrap()).unwrap();
        assert_eq!(
            attribution,
            json!({
                "path": ["/home/me/app.py"],
                "range": {
                    "start": {"line": 4, "col": 11},
                    "stop": {"line": 4, "col": 11}
                }
            })
        );
        assert_eq!(err.attributed_trace().len(), 2);
        assert_eq!(err.innermost().unwrap().line, 3);
    }

    #[test]
    fn frames_only_added_to_unresolved() {
        let err = WalkError::from(UnresolvedFreeVariable::new(FreeVariableChain::new(["q"], 2, 0)))
            .with_frames(|| vec![TraceFrame::new("a.py", 1)]);
        match err {
            WalkError::UnresolvedFreeVariable(inner) => assert_eq!(inner.trace.len(), 1),
            other => panic!("unexpected {other:?}"),
        }

        let err = WalkError::unsupported("socket").with_frames(|| vec![TraceFrame::new("a.py", 1)]);
        assert_eq!(err.to_string(), "cannot convert a value of type 'socket'");
    }

    #[test]
    fn display_names_chain_and_file() {
        let mut err = UnresolvedFreeVariable::new(FreeVariableChain::new(["missing"], 7, 4));
        err.push_frame(TraceFrame::new("m.py", 6));
        assert_eq!(
            err.to_string(),
            "unable to resolve free variable 'missing' at 7:4 in m.py"
        );

        let bare = UnresolvedFreeVariable::new(FreeVariableChain::new(["a", "b"], 3, 0));
        assert_eq!(bare.to_string(), "unable to resolve free variable 'a.b' at 3:0");
    }

    #[test]
    fn frames_carry_known_file_ids() {
        let frame = TraceFrame::new("m.py", 6).in_file(ObjectId(4));
        assert_eq!(frame.source_file_id, Some(ObjectId(4)));
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"source_file_id": 4, "path": "m.py", "line": 6})
        );
        assert_eq!(TraceFrame::new("m.py", 6).source_file_id, None);
    }
}
