//! Catalog-driven register acquisition
//!
//! One cycle walks the whole register catalog, one bus transaction per
//! descriptor. A failed read never aborts the cycle: the register's sample
//! comes back empty and the walk continues, so every cycle yields a
//! full-length sample set in catalog order.

use std::time::Duration;

use gridlink_meter::error::Result as MeterResult;
use gridlink_meter::{decode, MeterError, RegisterDescriptor, RegisterReader};
use tracing::{debug, info, warn};

use crate::clock::DeviceClock;
use crate::error::{AgentError, Result};

/// One register's decoded value for a cycle; `None` on read failure
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub descriptor: &'static RegisterDescriptor,
    pub value: Option<f64>,
}

/// One complete cycle's samples, always catalog-length and catalog-ordered
#[derive(Debug, Clone)]
pub struct SampleSet {
    pub device_id: String,
    pub captured_at: String,
    pub samples: Vec<Sample>,
}

impl SampleSet {
    pub fn success_count(&self) -> usize {
        self.samples.iter().filter(|s| s.value.is_some()).count()
    }

    pub fn total_count(&self) -> usize {
        self.samples.len()
    }
}

/// Walks the register catalog and produces sample sets
pub struct AcquisitionEngine {
    reader: Box<dyn RegisterReader>,
    catalog: &'static [RegisterDescriptor],
    device_id: String,
    clock: DeviceClock,
    pacing: Duration,
}

impl AcquisitionEngine {
    pub fn new(
        reader: Box<dyn RegisterReader>,
        catalog: &'static [RegisterDescriptor],
        device_id: String,
        clock: DeviceClock,
        pacing: Duration,
    ) -> Self {
        Self {
            reader,
            catalog,
            device_id,
            clock,
            pacing,
        }
    }

    /// Run one full acquisition cycle
    ///
    /// Always returns one sample per catalog entry, in catalog order; a
    /// register that fails to read contributes an empty sample and is not
    /// retried until the next cycle.
    pub async fn acquire(&mut self) -> SampleSet {
        let captured_at = self.clock.now_formatted();
        let mut samples = Vec::with_capacity(self.catalog.len());

        for (index, descriptor) in self.catalog.iter().enumerate() {
            if index > 0 {
                // Meter turnaround time between transactions
                tokio::time::sleep(self.pacing).await;
            }

            let value = match self.read_descriptor(descriptor).await {
                Ok(value) => {
                    debug!(
                        "{} = {} {}",
                        descriptor.name, value, descriptor.unit
                    );
                    Some(value)
                }
                Err(e) => {
                    warn!(
                        "Read of {} (0x{:04X}) failed: {}",
                        descriptor.name, descriptor.address, e
                    );
                    None
                }
            };
            samples.push(Sample { descriptor, value });
        }

        let set = SampleSet {
            device_id: self.device_id.clone(),
            captured_at,
            samples,
        };
        info!(
            "Acquisition cycle complete: {}/{} registers read",
            set.success_count(),
            set.total_count()
        );
        set
    }

    /// Read and decode a single catalog register (diagnostics spot check)
    pub async fn spot_check(&mut self, address: u16) -> Result<(&'static RegisterDescriptor, f64)> {
        let descriptor = gridlink_meter::descriptor_by_address(address).ok_or_else(|| {
            AgentError::config(format!("Address 0x{address:04X} is not in the register map"))
        })?;
        let value = self.read_descriptor(descriptor).await?;
        Ok((descriptor, value))
    }

    /// Read every catalog register, keeping the per-register error detail
    ///
    /// Diagnostics counterpart of [`acquire`](Self::acquire): same walk and
    /// pacing, but failures surface as errors instead of empty samples.
    pub async fn dump(
        &mut self,
    ) -> Vec<(&'static RegisterDescriptor, MeterResult<f64>)> {
        let mut readings = Vec::with_capacity(self.catalog.len());
        for (index, descriptor) in self.catalog.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.pacing).await;
            }
            let reading = self.read_descriptor(descriptor).await;
            readings.push((descriptor, reading));
        }
        readings
    }

    async fn read_descriptor(&mut self, descriptor: &RegisterDescriptor) -> MeterResult<f64> {
        let quantity = descriptor.kind.word_count();
        let words = self
            .reader
            .read_input_registers(descriptor.address, quantity)
            .await?;
        if words.len() != quantity as usize {
            return Err(MeterError::ProtocolError(format!(
                "Register 0x{:04X}: expected {} word(s), got {}",
                descriptor.address,
                quantity,
                words.len()
            )));
        }
        Ok(decode(descriptor, &words))
    }
}
