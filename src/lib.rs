pub mod airtime;
pub mod clock;
pub mod concentrator;
pub mod config;
pub mod error;
pub mod metrics;
pub mod packet;
pub mod packet_type;
pub mod scheduler;
pub mod simulation;
pub mod threading;
pub mod timing;

// Re-export for easier testing
pub use config::{DispatcherConfig, GatewayConfig, JitConfig};
pub use error::{EnqueueError, JitError};
pub use packet::{DownlinkPacket, Modulation, TxMode};
pub use packet_type::PacketType;
pub use scheduler::{JitDispatcher, JitQueue};
