//! Sampling and broadcast loop
//!
//! One iteration services the socket server, takes a single conversion,
//! scales it to volts and sends the formatted value to every connected peer.
//! The loop then sleeps for a fixed interval no matter how long the iteration
//! itself took.

use embedded_hal_async::delay::DelayNs;
use log::trace;

use crate::config::SamplingConfig;
use crate::sampling::{AnalogSource, Reading};
use crate::ws::{EventHandler, SocketServer, Transport};

pub struct EcgStreamer<'c, A, T, H> {
    config: &'c SamplingConfig,
    adc: A,
    server: SocketServer<T, H>,
}

impl<'c, A, T, H> EcgStreamer<'c, A, T, H>
where
    A: AnalogSource,
    T: Transport,
    H: EventHandler,
{
    pub fn new(config: &'c SamplingConfig, adc: A, server: SocketServer<T, H>) -> Self {
        Self {
            config,
            adc,
            server,
        }
    }

    /// Run one loop iteration without the trailing sleep.
    pub fn step(&mut self) -> Reading {
        self.server.tick();

        let reading = Reading::from_raw(self.adc.read_raw(), self.config);
        let text = reading.to_text();
        let peers = self.server.broadcast_text(&text);

        trace!("Sample {} -> {} V to {} peers", reading.raw, text, peers);
        reading
    }

    /// Sample and broadcast forever.
    pub async fn run<D: DelayNs>(&mut self, delay: &mut D) -> ! {
        loop {
            self.step();
            delay.delay_ms(self.config.interval_ms).await;
        }
    }

    pub fn server(&self) -> &SocketServer<T, H> {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut SocketServer<T, H> {
        &mut self.server
    }
}
