use crate::HarvestError;
use std::fmt;

/// Where the traversal engine is within one code
///
/// ```text
/// Init -> SearchSubmitted -> ResultCounted -> PageProcessing (loop) -> Finished
///                                  \-> Finished (zero results)
/// any non-terminal state -> Errored
/// ```
///
/// A code with several variants runs the search half once per variant, so
/// `ResultCounted`, `PageProcessing` and `Finished` may all move back to
/// `SearchSubmitted` for the next variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraversalState {
    Init,
    SearchSubmitted,
    ResultCounted,
    PageProcessing,
    Finished,
    Errored,
}

impl TraversalState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Errored)
    }

    pub fn can_transition_to(&self, next: TraversalState) -> bool {
        use TraversalState::*;

        if next == Errored {
            return *self != Errored;
        }

        match (self, next) {
            (Init, SearchSubmitted) => true,
            (SearchSubmitted, ResultCounted) => true,
            (ResultCounted, Finished) => true,
            (ResultCounted, PageProcessing) => true,
            (PageProcessing, PageProcessing) => true,
            (PageProcessing, Finished) => true,
            // Next variant of the same code
            (ResultCounted, SearchSubmitted) => true,
            (PageProcessing, SearchSubmitted) => true,
            _ => false,
        }
    }

    /// Moves to `next`, rejecting edges the state machine does not have
    pub fn advance(&mut self, next: TraversalState) -> Result<(), HarvestError> {
        if !self.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for TraversalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::SearchSubmitted => "search_submitted",
            Self::ResultCounted => "result_counted",
            Self::PageProcessing => "page_processing",
            Self::Finished => "finished",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}
