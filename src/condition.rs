/// Reduce a per-keyword presence vector to a single trigger decision.
use crate::matcher::PresenceVector;

/// Whether the watcher fires on keywords appearing or on keywords being absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Found,
    Missing,
}

/// How the per-keyword signals are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Any,
    All,
}

/// The complete trigger rule: polarity plus aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Condition {
    pub polarity: Polarity,
    pub aggregation: Aggregation,
}

impl Condition {
    pub fn new(trigger_on_found: bool, require_all: bool) -> Self {
        Self {
            polarity: if trigger_on_found {
                Polarity::Found
            } else {
                Polarity::Missing
            },
            aggregation: if require_all {
                Aggregation::All
            } else {
                Aggregation::Any
            },
        }
    }

    /// Apply the four-way truth table to `presence`.
    pub fn evaluate(&self, presence: &PresenceVector) -> bool {
        let wanted = self.polarity == Polarity::Found;
        let slots = presence.slots();
        match self.aggregation {
            Aggregation::All => slots.iter().all(|&seen| seen == wanted),
            Aggregation::Any => slots.iter().any(|&seen| seen == wanted),
        }
    }

    /// Log phrase for a tick where the condition held.
    pub fn triggered_phrase(&self) -> &'static str {
        match (self.polarity, self.aggregation) {
            (Polarity::Found, Aggregation::All) => "all keywords are found",
            (Polarity::Found, Aggregation::Any) => "one or more keywords are found",
            (Polarity::Missing, Aggregation::All) => "all keywords are missing",
            (Polarity::Missing, Aggregation::Any) => "one or more keywords are missing",
        }
    }

    /// Log phrase for a tick where the condition did not hold.
    pub fn idle_phrase(&self) -> &'static str {
        match (self.polarity, self.aggregation) {
            (Polarity::Found, Aggregation::All) => "one or more keywords were missing",
            (Polarity::Found, Aggregation::Any) => "all keywords were missing",
            (Polarity::Missing, Aggregation::All) => "one or more keywords were found",
            (Polarity::Missing, Aggregation::Any) => "all keywords were found",
        }
    }

    /// Human sentence for the startup summary, e.g. `if any of "A" or "B" is found`.
    pub fn describe(&self, keywords: &[String]) -> String {
        let verb = match self.polarity {
            Polarity::Found => "found",
            Polarity::Missing => "missing",
        };
        let quoted: Vec<String> = keywords.iter().map(|k| format!("\"{k}\"")).collect();
        match quoted.as_slice() {
            [] => format!("if nothing is {verb}"),
            [only] => format!("if {only} is {verb}"),
            [head @ .., last] => {
                let head = head.join(", ");
                match self.aggregation {
                    Aggregation::All => format!("if {head} and {last} are all {verb}"),
                    Aggregation::Any => format!("if any of {head} or {last} is {verb}"),
                }
            }
        }
    }
}
