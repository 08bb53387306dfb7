//! Fuzzer for the HP (`IOB18`) I/O blocks of 7-series devices.
//!
//! [`sample`] draws a random design over the whole I/O grid and records it as
//! a [`manifest::Manifest`]; [`verilog`] turns that into HDL for the vendor
//! flow. Once the flow has produced a bitstream, [`tags`] re-reads the
//! manifest and emits the feature tags the correlation stage matches against
//! the configuration bits. [`odelay`] does the same for the output delays.

pub mod config;
pub mod device;
pub mod iostd;
pub mod lutmaker;
pub mod manifest;
pub mod odelay;
pub mod sample;
pub mod settings;
pub mod tags;
pub mod verilog;
