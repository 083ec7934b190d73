//! Round planning: which cores exchange data in which round.
//!
//! With `n` cores and `half = n / 2`:
//!
//! ```text
//! inter  round r = 1..=half        pairs (i, i + half)          i = 0..r
//! intra  round r = 1, 3, 5 ≤ half  pairs (i, (i + 1) % half)    i = 0, 2, 4 < r
//! ```
//!
//! Intra rounds advance by two because their pair index advances by two;
//! their printed label is `(r + 1) / 2` so labels stay consecutive.

use super::config::Placement;
use crate::numa::CoreId;
use crate::{Error, Result};

/// One (source, destination) core pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pair {
    /// Core the source participant runs on
    pub source: CoreId,
    /// Core the destination participant runs on and allocates on
    pub destination: CoreId,
}

impl Pair {
    /// Creates a pair.
    #[must_use]
    pub const fn new(source: CoreId, destination: CoreId) -> Self {
        Self {
            source,
            destination,
        }
    }
}

impl std::fmt::Display for Pair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}", self.source, self.destination)
    }
}

/// Which side of a pair a participant plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Writes data, timed
    Source,
    /// Owns the receive buffer
    Destination,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Destination => f.write_str("destination"),
        }
    }
}

/// The concurrent pairs of one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    /// Raw loop index `r`
    pub index: usize,
    /// Label printed in the report
    pub label: usize,
    /// Pairs running concurrently
    pub pairs: Vec<Pair>,
}

/// Every round of a run, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundPlan {
    placement: Placement,
    num_cores: usize,
    rounds: Vec<Round>,
}

impl RoundPlan {
    /// Plans the rounds for `num_cores` cores.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when the topology is too small for
    /// any pair with distinct cores: intra placement needs `num_cores / 2 >= 2`,
    /// inter placement needs `num_cores >= 2`.
    pub fn new(placement: Placement, num_cores: usize) -> Result<Self> {
        let half = num_cores / 2;
        let rounds = match placement {
            Placement::IntraSocket => {
                if half < 2 {
                    return Err(Error::InvalidConfig(format!(
                        "intra-socket placement needs at least 4 cores, topology has {num_cores}"
                    )));
                }
                (1..=half)
                    .step_by(2)
                    .map(|r| Round {
                        index: r,
                        label: r.div_ceil(2),
                        pairs: (0..r)
                            .step_by(2)
                            .map(|i| Pair::new(CoreId(i), CoreId((i + 1) % half)))
                            .collect(),
                    })
                    .collect()
            }
            Placement::InterSocket => {
                if half < 1 {
                    return Err(Error::InvalidConfig(format!(
                        "inter-socket placement needs at least 2 cores, topology has {num_cores}"
                    )));
                }
                (1..=half)
                    .map(|r| Round {
                        index: r,
                        label: r,
                        pairs: (0..r)
                            .map(|i| Pair::new(CoreId(i), CoreId(i + half)))
                            .collect(),
                    })
                    .collect()
            }
        };

        Ok(Self {
            placement,
            num_cores,
            rounds,
        })
    }

    /// Returns the placement the plan was built for.
    #[must_use]
    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Returns the core count the plan was built for.
    #[must_use]
    pub fn num_cores(&self) -> usize {
        self.num_cores
    }

    /// Returns the rounds in order.
    #[must_use]
    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    /// Returns the number of rounds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    /// Returns true if there are no rounds.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }
}
