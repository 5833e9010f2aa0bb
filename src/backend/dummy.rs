//! Constant-value backend for commissioning without real devices.

use async_trait::async_trait;
use log::debug;

use crate::protocol::request::{
    OP_READ_COILS, OP_READ_DISCRETE_INPUTS, OP_READ_HOLDING_REGISTERS, OP_READ_INPUT_REGISTERS,
    OP_WRITE_MULTIPLE_COILS, OP_WRITE_MULTIPLE_REGISTERS, OP_WRITE_SINGLE_COIL,
    OP_WRITE_SINGLE_REGISTER,
};
use crate::protocol::OperationRequest;
use crate::utils::error::GatewayError;

use super::traits::ExecutionBackend;

/// Answers every read with a fixed value and every write with success.
pub struct DummyBackend {
    value: u16,
}

impl DummyBackend {
    pub fn new(value: u16) -> Self {
        Self { value }
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl ExecutionBackend for DummyBackend {
    async fn execute(&self, request: &OperationRequest) -> Result<Vec<u16>, GatewayError> {
        debug!(
            "Dummy backend handling function {} for {}:{}",
            request.operation_code, request.target_address, request.target_port
        );
        match request.operation_code {
            OP_READ_COILS | OP_READ_DISCRETE_INPUTS | OP_READ_HOLDING_REGISTERS
            | OP_READ_INPUT_REGISTERS => {
                Ok(vec![self.value; request.register_count as usize])
            }
            OP_WRITE_SINGLE_COIL | OP_WRITE_SINGLE_REGISTER | OP_WRITE_MULTIPLE_COILS
            | OP_WRITE_MULTIPLE_REGISTERS => Ok(Vec::new()),
            other => Err(GatewayError::UnsupportedOperation(other)),
        }
    }
}
