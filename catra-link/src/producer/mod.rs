//! Sample producers and the fallback policy
//!
//! Two things can fill the store: the link worker reading a real transport,
//! or the [`SyntheticProducer`]. The connection state machine knows nothing
//! about the second one. The application asks [`FallbackPolicy::select`]
//! which producer should run for the current state and starts or stops the
//! synthetic one accordingly.

mod synthetic;

pub use synthetic::{SyntheticFrame, SyntheticProducer, SyntheticSource, write_frame};

use crate::config::FallbackConfig;
use crate::core::types::ConnectionState;

/// Which producer feeds the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerKind {
    RealTransport,
    Synthetic,
}

/// Decides when synthetic data stands in for the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackPolicy {
    synthetic_on_failure: bool,
}

impl FallbackPolicy {
    pub fn new(synthetic_on_failure: bool) -> Self {
        Self {
            synthetic_on_failure,
        }
    }

    pub fn from_config(config: &FallbackConfig) -> Self {
        Self::new(config.synthetic)
    }

    /// Producer that should be active in `state`
    ///
    /// Synthetic data only replaces a link that gave up (`Failed`); a link
    /// that is still retrying keeps the real producer.
    pub fn select(&self, state: ConnectionState) -> ProducerKind {
        if self.synthetic_on_failure && state == ConnectionState::Failed {
            ProducerKind::Synthetic
        } else {
            ProducerKind::RealTransport
        }
    }
}
