use std::fmt::Debug;

use async_trait::async_trait;

use crate::model::Coordinates;

/// Source of the device position.
///
/// `None` means no fix yet (or permission never granted). That is a valid
/// steady state, not an error.
#[async_trait]
pub trait LocationProvider: Send + Sync + Debug {
    async fn current_fix(&self) -> Option<Coordinates>;
}

/// Position taken from configuration or command-line flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedLocation(Option<Coordinates>);

impl FixedLocation {
    pub fn new(fix: Option<Coordinates>) -> Self {
        Self(fix)
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_fix(&self) -> Option<Coordinates> {
        self.0
    }
}
