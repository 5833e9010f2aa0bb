//! Modbus TCP execution backend.
//!
//! Opens a fresh TCP connection per request, bounded by the request's own
//! timeout, dispatches on the function code and disconnects. Coil and
//! discrete-input reads are widened to 0/1 words so every function returns
//! the same result shape.

use std::net::SocketAddr;

use async_trait::async_trait;
use log::debug;
use tokio::net::lookup_host;
use tokio::time::timeout;
use tokio_modbus::client::{tcp, Reader, Writer};
use tokio_modbus::Slave;

use crate::protocol::request::{
    OP_READ_COILS, OP_READ_DISCRETE_INPUTS, OP_READ_HOLDING_REGISTERS, OP_READ_INPUT_REGISTERS,
    OP_WRITE_MULTIPLE_COILS, OP_WRITE_MULTIPLE_REGISTERS, OP_WRITE_SINGLE_COIL,
    OP_WRITE_SINGLE_REGISTER,
};
use crate::protocol::OperationRequest;
use crate::utils::error::GatewayError;

use super::traits::ExecutionBackend;

pub struct ModbusBackend;

impl ModbusBackend {
    pub fn new() -> Self {
        Self
    }

    async fn resolve(request: &OperationRequest) -> Result<SocketAddr, GatewayError> {
        let target = format!("{}:{}", request.target_address, request.target_port);
        let resolved = lookup_host(&target)
            .await
            .map_err(|e| {
                GatewayError::BackendFailure(format!("failed to resolve {}: {}", target, e))
            })?
            .next()
            .ok_or_else(|| {
                GatewayError::BackendFailure(format!("no address found for {}", target))
            });
        resolved
    }

    async fn query(request: &OperationRequest) -> Result<Vec<u16>, GatewayError> {
        validate(request)?;

        let addr = Self::resolve(request).await?;
        debug!(
            "Executing function {} against {} unit {}",
            request.operation_code, addr, request.unit_id
        );

        let mut ctx = tcp::connect_slave(addr, Slave(request.unit_id))
            .await
            .map_err(|e| {
                GatewayError::BackendFailure(format!("failed to connect to Modbus server: {}", e))
            })?;

        let offset = request.register_offset;
        let count = request.register_count;

        let results = match request.operation_code {
            OP_READ_COILS => {
                let bits = flatten(ctx.read_coils(offset, count).await, "read coils")?;
                bits_to_words(&bits)
            }
            OP_READ_DISCRETE_INPUTS => {
                let bits = flatten(
                    ctx.read_discrete_inputs(offset, count).await,
                    "read discrete inputs",
                )?;
                bits_to_words(&bits)
            }
            OP_READ_HOLDING_REGISTERS => flatten(
                ctx.read_holding_registers(offset, count).await,
                "read holding registers",
            )?,
            OP_READ_INPUT_REGISTERS => flatten(
                ctx.read_input_registers(offset, count).await,
                "read input registers",
            )?,
            OP_WRITE_SINGLE_COIL => {
                let value = single_value(request)?;
                flatten(
                    ctx.write_single_coil(offset, value != 0).await,
                    "write single coil",
                )?;
                Vec::new()
            }
            OP_WRITE_SINGLE_REGISTER => {
                let value = single_value(request)?;
                flatten(
                    ctx.write_single_register(offset, value).await,
                    "write single register",
                )?;
                Vec::new()
            }
            OP_WRITE_MULTIPLE_COILS => {
                let bits: Vec<bool> = request.values.iter().map(|v| *v != 0).collect();
                flatten(
                    ctx.write_multiple_coils(offset, &bits).await,
                    "write multiple coils",
                )?;
                Vec::new()
            }
            OP_WRITE_MULTIPLE_REGISTERS => {
                flatten(
                    ctx.write_multiple_registers(offset, &request.values).await,
                    "write multiple registers",
                )?;
                Vec::new()
            }
            // validate() already rejected everything else
            other => return Err(GatewayError::UnsupportedOperation(other)),
        };

        Ok(results)
    }
}

impl Default for ModbusBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionBackend for ModbusBackend {
    async fn execute(&self, request: &OperationRequest) -> Result<Vec<u16>, GatewayError> {
        timeout(request.timeout, Self::query(request)).await?
    }
}

/// Rejects requests the Modbus backend cannot serve before any connection
/// is opened.
fn validate(request: &OperationRequest) -> Result<(), GatewayError> {
    match request.operation_code {
        OP_READ_COILS | OP_READ_DISCRETE_INPUTS | OP_READ_HOLDING_REGISTERS
        | OP_READ_INPUT_REGISTERS | OP_WRITE_MULTIPLE_COILS | OP_WRITE_MULTIPLE_REGISTERS => Ok(()),
        OP_WRITE_SINGLE_COIL | OP_WRITE_SINGLE_REGISTER => {
            single_value(request).map(|_| ())
        }
        other => Err(GatewayError::UnsupportedOperation(other)),
    }
}

/// The value to write for single-write functions, taken from index 0 of the
/// request's value list.
fn single_value(request: &OperationRequest) -> Result<u16, GatewayError> {
    request
        .values
        .first()
        .copied()
        .ok_or(GatewayError::InvalidField("DATA"))
}

fn bits_to_words(bits: &[bool]) -> Vec<u16> {
    bits.iter().map(|bit| u16::from(*bit)).collect()
}

// Client calls return a nested result: transport errors outside, Modbus
// exception responses inside. Both collapse into a backend failure here.
fn flatten<T, X, E>(result: Result<Result<T, X>, E>, action: &str) -> Result<T, GatewayError>
where
    X: std::fmt::Display,
    E: std::fmt::Display,
{
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(exception)) => Err(GatewayError::BackendFailure(format!(
            "failed to {}: {}",
            action, exception
        ))),
        Err(err) => Err(GatewayError::BackendFailure(format!(
            "failed to {}: {}",
            action, err
        ))),
    }
}
