use std::fmt;

/// The five fixed stages of the transaction pipeline, in ascending execution
/// order (§4.7). The order is structural, not configurable — handlers are
/// assigned to one of these, never inserted between them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    DuplicateCheck,
    Validation,
    Routing,
    Processing,
    Audit,
}

impl Stage {
    /// Ascending execution order. `AUDIT` always runs last, including on the
    /// short-circuit path (P8).
    pub const ORDER: [Stage; 5] = [
        Stage::DuplicateCheck,
        Stage::Validation,
        Stage::Routing,
        Stage::Processing,
        Stage::Audit,
    ];

    pub fn index(self) -> usize {
        Self::ORDER.iter().position(|s| *s == self).expect("Stage::ORDER is exhaustive")
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::DuplicateCheck => "DUPLICATE_CHECK",
            Stage::Validation => "VALIDATION",
            Stage::Routing => "ROUTING",
            Stage::Processing => "PROCESSING",
            Stage::Audit => "AUDIT",
        };
        f.write_str(name)
    }
}
