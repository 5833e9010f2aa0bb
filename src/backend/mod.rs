pub mod dummy;
pub mod modbus;
pub mod traits;

pub use dummy::DummyBackend;
pub use modbus::ModbusBackend;
pub use traits::ExecutionBackend;
