//! The seam between the detector and a radar.
//!
//! A [`Client`] runs a [`SessionConfig`] and hands out one [`ExtendedResult`]
//! per frame. Hardware clients live outside this crate; [`SimulatedClient`]
//! synthesises frames for tests and the command line tool.

pub mod simulated;

pub use simulated::{Reflector, SimulatedClient, SimulatedClientConfig};

use crate::error::Result;
use crate::sensor::{ExtendedMetadata, ExtendedResult, SessionConfig};

pub trait Client {
    /// Configure the sensors. Replaces any previous session.
    fn setup_session(&mut self, session_config: &SessionConfig) -> Result<ExtendedMetadata>;

    fn start_session(&mut self) -> Result<()>;

    /// Block until the next frame of every group/sensor is available.
    fn get_next(&mut self) -> Result<ExtendedResult>;

    fn stop_session(&mut self) -> Result<()>;
}

impl<C: Client + ?Sized> Client for &mut C {
    fn setup_session(&mut self, session_config: &SessionConfig) -> Result<ExtendedMetadata> {
        (**self).setup_session(session_config)
    }

    fn start_session(&mut self) -> Result<()> {
        (**self).start_session()
    }

    fn get_next(&mut self) -> Result<ExtendedResult> {
        (**self).get_next()
    }

    fn stop_session(&mut self) -> Result<()> {
        (**self).stop_session()
    }
}
