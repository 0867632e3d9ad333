pub mod battery;
pub mod network;
pub mod sampler;

pub use battery::{BatterySensor, MockSensor, SensorError, SysfsBattery};
pub use network::{AddressProvider, StaticAddress, UdpRouteProbe};
pub use sampler::LocalSampler;
