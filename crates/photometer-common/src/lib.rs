//! Shared model for photometer readers: sites, devices, the registry that
//! ties them together, the solar ephemeris and the night window gate.

pub mod device;
pub mod env;
pub mod ephemeris;
pub mod error;
pub mod gate;
pub mod reading;
pub mod registry;
pub mod shutdown;
pub mod site;

pub use device::{Device, DeviceKind, Endpoint};
pub use error::{ReaderError, ReaderResult};
pub use gate::{GateDecision, NightWindowGate, OpenGate, WindowGate};
pub use reading::Reading;
pub use registry::{Registry, RegistryConfig};
pub use shutdown::forward_shutdown;
pub use site::{Site, TimeRange};
