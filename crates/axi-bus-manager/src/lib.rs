//! AXI4 bus-manager transaction engine for hardware simulation harnesses.
//!
//! This crate converts high-level "write N bytes at address A" / "read N
//! bytes at address A" requests into a stream of protocol-compliant AXI4
//! bursts on five independent handshake channels, and reassembles the
//! responses back into a caller-facing result. It is the transaction-level
//! component a simulation harness uses to drive an AXI4 slave device; it
//! does not itself toggle signals on a clock edge, model a slave, or run a
//! simulator event loop — see [`channel`] for the narrow interface it
//! expects its caller to provide.
//!
//! # Architecture
//!
//! Two mirror-image engines, [`WriteEngine`] and [`ReadEngine`], share no
//! state; [`BusManager`] bundles one of each for callers that want both. Each
//! engine owns an issue thread (plans bursts, drives AW/W or AR) and a
//! response thread (collects B or R beats, reassembles the result), talking
//! to its caller through a [`registry::Registry`] and to each other through a
//! bounded [`crate::id_pool::IdPool`] of transaction IDs.
//!
//! # Example
//!
//! ```no_run
//! use axi_bus_manager::{BusManager, BusGeometry, Attributes};
//! use axi_bus_manager::channel::{
//!     AddressChannel, AddressTransaction, WriteDataChannel, WriteBeat,
//!     ResponseChannel, BBeat, RBeat, WriteChannels, ReadChannels,
//! };
//! use axi_bus_manager::error::ChannelError;
//!
//! # struct MyAw; impl AddressChannel for MyAw {
//! #     fn post(&self, _: AddressTransaction) -> Result<(), ChannelError> { Ok(()) }
//! # }
//! # struct MyW; impl WriteDataChannel for MyW {
//! #     fn post(&self, _: WriteBeat) -> Result<(), ChannelError> { Ok(()) }
//! # }
//! # struct MyB; impl ResponseChannel for MyB {
//! #     type Beat = BBeat;
//! #     fn recv(&self) -> Result<BBeat, ChannelError> { unimplemented!() }
//! # }
//! # struct MyAr; impl AddressChannel for MyAr {
//! #     fn post(&self, _: AddressTransaction) -> Result<(), ChannelError> { Ok(()) }
//! # }
//! # struct MyR; impl ResponseChannel for MyR {
//! #     type Beat = RBeat;
//! #     fn recv(&self) -> Result<RBeat, ChannelError> { unimplemented!() }
//! # }
//! let geometry = BusGeometry::new(4, 4)?;
//! let manager = BusManager::new(
//!     geometry,
//!     WriteChannels { aw: MyAw, w: MyW, b: MyB },
//!     ReadChannels { ar: MyAr, r: MyR },
//! );
//!
//! manager.write(0x1000, vec![1, 2, 3, 4], Attributes::default())?;
//! let (data, _resp) = manager.read(0x1000, 4, Attributes::default())?;
//! assert_eq!(data, vec![1, 2, 3, 4]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]

pub mod attributes;
pub mod channel;
pub mod engine;
pub mod error;
mod facade;
pub mod id_pool;
pub mod model;
pub mod planner;
pub mod registry;
pub mod token;

pub use attributes::{Attributes, AxCache, AxProt, BurstType, Lock};
pub use channel::BusGeometry;
pub use engine::read::ReadEngine;
pub use engine::write::WriteEngine;
pub use error::{CallerError, ChannelError, EngineError, EngineFault, PlannerError};
pub use facade::BusManager;
pub use model::{ReadRequest, ReadResult, ResponseCode, WriteRequest, WriteResult};
pub use token::Token;
