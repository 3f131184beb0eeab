//! The Circle relayer watches the bridge adapters of its chains for outgoing
//! CCTP messages, waits for Circle to attest them and delivers them to the
//! message transmitter of their destination chain.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use eyre::Result;

use ortege_base::agent_main;

use crate::relayer::CircleRelayer;

mod attestation;
mod chain;
mod clock;
mod correlator;
mod driver;
mod relayer;
mod settings;

#[cfg(test)]
mod test_utils;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    // Logging is not initialised at this point, so, using `println!`
    println!("Circle relayer starting up...");

    agent_main::<CircleRelayer>().await
}
