//! Implementation of OPL music capture constructs.
//!
//! This crate provides a high-level interface for turning OPL register
//! captures into game-ready music data. A quick overview of the modules:
//!
//! - `dro`: [DOSBox Raw OPL (DRO)][dro] file format support (v0.1 and v2.0)
//! - `imf`: [id Software Music Format (IMF)][imf] file format support
//! - `convert`: DRO to IMF event stream conversion
//! - `registers`: helper OPL register definitions
//!
//! [dro]: https://moddingwiki.shikadi.net/wiki/DRO_Format
//! [imf]: https://moddingwiki.shikadi.net/wiki/IMF_Format
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub(crate) mod data_types;

pub mod convert;
pub mod dro;
pub mod imf;
pub mod registers;

pub use crate::convert::{convert_dro_to_imf, ConvertOptions, DEFAULT_IMF_RATE};
pub use crate::data_types::{TagError, TagString};
pub use crate::dro::{Dro, Error as DroError};
pub use crate::imf::{Error as ImfError, ImfMusic, ImfType};
