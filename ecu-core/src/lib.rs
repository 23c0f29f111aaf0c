#![no_std]

// Shared logic for the two-node CAN ECU pair.
//
// Everything in this crate runs on the MCU images and on the host emulator
// alike: collaborators (storage, bus, LEDs, UART, sensors) are traits, and
// all state lives in explicit structs owned by the node that uses it.

pub mod can;
pub mod config;
pub mod dtc;
pub mod inputs;
pub mod node;
pub mod presentation;
pub mod scheduler;
pub mod state;
pub mod storage;
pub mod telemetry;
pub mod tester;
pub mod ticks;
