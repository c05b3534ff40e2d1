mod system;
pub mod vin;

pub use system::System;
pub use vin::VinAuditSystem;
