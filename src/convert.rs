//! Conversion of DRO captures into IMF songs.
//!
//! A capture counts time in milliseconds (1000 Hz); IMF players run at
//! a rate of their own choosing, commonly 560 Hz (Commander Keen),
//! 700 Hz (Wolfenstein 3D) or 280 Hz (Duke Nukem II). The conversion
//! accumulates capture delays and rescales them onto the target rate
//! as it copies register writes across.

use snafu::{ResultExt, Snafu};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::dro::{self, Command, Dro};
use crate::imf::{ImfEvent, ImfMusic, ImfType};
use crate::registers;

#[cfg(not(feature = "std"))]
macro_rules! eprintln {
    ($_: expr) => {
        /* no-op */
    };
}

/// Default IMF playback rate in Hz (Commander Keen)
pub const DEFAULT_IMF_RATE: u16 = 560;

/// An error converting a DRO capture
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// Failed to decode DRO song data
    DecodeDro { source: dro::ParseError },
}

/// Parameters of a single conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Target playback rate in Hz
    pub rate: u16,
    /// Output container variant
    pub imf_type: ImfType,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            rate: DEFAULT_IMF_RATE,
            imf_type: ImfType::Type0,
        }
    }
}

/// Convert a parsed DRO capture into an IMF song.
///
/// Register writes are carried across in input order. Delays are
/// accumulated in a 16-bit millisecond counter (which wraps, as the
/// capture tools' own counter did) and flushed onto the preceding
/// output event whenever a write is emitted, rescaled with truncating
/// division.
///
/// Data addressed to a second OPL chip is dropped, since the output
/// format carries a single chip. The loss is reported once per song,
/// on the first chip-select command or secondary key-on write.
pub fn convert_dro_to_imf(dro: &Dro, options: &ConvertOptions) -> Result<ImfMusic, Error> {
    let mut events = Vec::new();
    // the null register/value pair every stream opens with;
    // the delay accumulated before the first real write lands on it
    let mut pending = ImfEvent {
        register: 0,
        value: 0,
        delay: 0,
    };
    let mut last_delay: u16 = 0;
    let mut warn_of_dual_opl = true;

    let mut commands = dro.commands();
    while let Some(command) = commands.next_command().context(DecodeDroSnafu)? {
        match command {
            Command::Delay { ms } => {
                last_delay = last_delay.wrapping_add(ms);
            }
            Command::SelectChip { .. } => {
                if warn_of_dual_opl {
                    eprintln!(
                        "Warning: This song uses multiple OPL chips, which the IMF format doesn't support!"
                    );
                    warn_of_dual_opl = false;
                }
            }
            Command::SecondaryWrite { register, value } => {
                // only a key-on counts as real second-chip use; the
                // register dump at the start of a capture touches the
                // whole map and must not trip the warning
                if warn_of_dual_opl
                    && registers::is_key_on_register(register)
                    && value & registers::KEY_ON_BIT != 0
                {
                    eprintln!(
                        "Warning: This song uses multiple OPL chips, which the IMF format doesn't support!"
                    );
                    warn_of_dual_opl = false;
                }
            }
            Command::Write { register, value } => {
                pending.delay = scale_delay(last_delay, options.rate);
                last_delay = 0;
                events.push(pending);
                pending = ImfEvent {
                    register,
                    value,
                    delay: 0,
                };
            }
        }
    }

    // the final event keeps a zero delay, terminating the stream;
    // a delay accumulated after the last write is discarded
    events.push(pending);

    Ok(ImfMusic {
        imf_type: options.imf_type,
        events,
        tags: None,
    })
}

/// Rescale a millisecond delay to ticks at the given playback rate,
/// truncating towards zero.
fn scale_delay(ms: u16, rate: u16) -> u16 {
    (u32::from(ms) * u32::from(rate) / 1000) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dro::{FileHeader, Header, V01Header, V2Header};

    fn v01_dro(data: &[u8]) -> Dro {
        Dro {
            file_header: FileHeader {
                signature: *b"DBRAWOPL",
                version_major: 0,
                version_minor: 1,
            },
            header: Header::V01(V01Header {
                length_ms: 0,
                length_bytes: data.len() as u32,
                hardware_type: V01Header::HARDWARE_TYPE_OPL2,
                wide_hardware_field: false,
            }),
            data: data.to_vec(),
        }
    }

    fn v2_dro(codemap: &[u8], pairs: &[u8]) -> Dro {
        let mut map = [0u8; 128];
        map[..codemap.len()].copy_from_slice(codemap);
        Dro {
            file_header: FileHeader {
                signature: *b"DBRAWOPL",
                version_major: 2,
                version_minor: 0,
            },
            header: Header::V2(V2Header {
                length_pairs: (pairs.len() / 2) as u32,
                length_ms: 0,
                hardware_type: V2Header::HARDWARE_TYPE_OPL2,
                format: V2Header::FORMAT_INTERLEAVED,
                compression: 0,
                short_delay_code: 0xFE,
                long_delay_code: 0xFF,
                codemap_length: codemap.len() as u8,
                codemap: map,
            }),
            data: pairs.to_vec(),
        }
    }

    #[test]
    fn converts_a_single_write() {
        let dro = v01_dro(&[0xB0, 0x31]);
        let music = convert_dro_to_imf(&dro, &ConvertOptions::default()).unwrap();
        assert_eq!(
            music.events,
            [
                ImfEvent {
                    register: 0,
                    value: 0,
                    delay: 0,
                },
                ImfEvent {
                    register: 0xB0,
                    value: 0x31,
                    delay: 0,
                },
            ]
        );
        assert_eq!(music.imf_type, ImfType::Type0);
    }

    #[test]
    fn an_empty_song_is_a_lone_null_event() {
        let dro = v01_dro(&[]);
        let music = convert_dro_to_imf(&dro, &ConvertOptions::default()).unwrap();
        assert_eq!(
            music.events,
            [ImfEvent {
                register: 0,
                value: 0,
                delay: 0,
            }]
        );
    }

    #[test]
    fn scales_delays_with_truncating_division() {
        // 1000 ms at 560 Hz is exactly 560 ticks
        let dro = v01_dro(&[0x01, 0xE7, 0x03, 0xB0, 0x31]);
        let music = convert_dro_to_imf(&dro, &ConvertOptions::default()).unwrap();
        assert_eq!(music.events[0].delay, 560);

        // 1 ms at 560 Hz truncates to zero
        let dro = v01_dro(&[0x00, 0x00, 0xB0, 0x31]);
        let music = convert_dro_to_imf(&dro, &ConvertOptions::default()).unwrap();
        assert_eq!(music.events[0].delay, 0);

        // 1000 ms at 700 Hz is 700 ticks
        let dro = v01_dro(&[0x01, 0xE7, 0x03, 0xB0, 0x31]);
        let options = ConvertOptions {
            rate: 700,
            ..Default::default()
        };
        let music = convert_dro_to_imf(&dro, &options).unwrap();
        assert_eq!(music.events[0].delay, 700);
    }

    #[test]
    fn delay_lands_on_the_preceding_event() {
        let dro = v01_dro(&[
            0xB0, 0x31, // write
            0x00, 0x63, // 100 ms
            0x00, 0x63, // 100 ms more
            0xB0, 0x11, // write
        ]);
        let music = convert_dro_to_imf(&dro, &ConvertOptions::default()).unwrap();
        assert_eq!(music.events.len(), 3);
        // both delays accumulate onto the first write, not the second
        assert_eq!(music.events[1].delay as u32, 200 * 560 / 1000);
        assert_eq!(music.events[2].delay, 0);
    }

    #[test]
    fn delay_accumulator_wraps_at_16_bits() {
        // two 40000 ms delays overflow: 80000 mod 65536 = 14464
        let dro = v01_dro(&[
            0x01, 0x3F, 0x9C, // 40000 ms
            0x01, 0x3F, 0x9C, // 40000 ms
            0xB0, 0x31,
        ]);
        let options = ConvertOptions {
            rate: 1000,
            ..Default::default()
        };
        let music = convert_dro_to_imf(&dro, &options).unwrap();
        assert_eq!(music.events[0].delay, 14464);
    }

    #[test]
    fn trailing_delay_is_discarded() {
        let dro = v01_dro(&[0xB0, 0x31, 0x01, 0xE7, 0x03]);
        let music = convert_dro_to_imf(&dro, &ConvertOptions::default()).unwrap();
        assert_eq!(music.events.len(), 2);
        assert_eq!(music.events[1].delay, 0);
    }

    #[test]
    fn chip_selects_produce_no_events() {
        let dro = v01_dro(&[0x02, 0x03, 0x02, 0xB0, 0x31]);
        let music = convert_dro_to_imf(&dro, &ConvertOptions::default()).unwrap();
        assert_eq!(music.events.len(), 2);
    }

    #[test]
    fn second_chip_writes_are_dropped() {
        // codemap entry 1 is a key-on register; the secondary key-on
        // and the secondary frequency write both vanish from the
        // output, while the primary write survives
        let dro = v2_dro(
            &[0xA0, 0xB0],
            &[
                0x81, 0x31, // secondary key-on (bit 5 set)
                0x80, 0x57, // secondary frequency
                0x00, 0x42, // primary frequency
            ],
        );
        let music = convert_dro_to_imf(&dro, &ConvertOptions::default()).unwrap();
        assert_eq!(
            music.events,
            [
                ImfEvent {
                    register: 0,
                    value: 0,
                    delay: 0,
                },
                ImfEvent {
                    register: 0xA0,
                    value: 0x42,
                    delay: 0,
                },
            ]
        );
    }

    #[test]
    fn converts_v2_delays() {
        let dro = v2_dro(
            &[0xB0],
            &[
                0xFE, 0xE7, // short delay: 232 ms
                0xFF, 0x02, // long delay: 768 ms
                0x00, 0x31,
            ],
        );
        let options = ConvertOptions {
            rate: 1000,
            ..Default::default()
        };
        let music = convert_dro_to_imf(&dro, &options).unwrap();
        assert_eq!(music.events[0].delay, 1000);
    }

    #[test]
    fn truncated_captures_fail_outright() {
        let mut dro = v01_dro(&[0xB0, 0x31]);
        dro.data.pop();
        let err = convert_dro_to_imf(&dro, &ConvertOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::DecodeDro {
                source: dro::ParseError::TruncatedInput { .. },
            }
        ));
    }

    #[cfg(feature = "std")]
    #[test]
    fn converts_a_file_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let dro_path = dir.path().join("capture.dro");
        let imf_path = dir.path().join("song.wlf");

        let mut capture = Vec::new();
        capture.extend_from_slice(b"DBRAWOPL");
        capture.extend_from_slice(&[0x00, 0x00, 0x01, 0x00]);
        capture.extend_from_slice(&500u32.to_le_bytes()); // length in ms
        capture.extend_from_slice(&7u32.to_le_bytes()); // length in bytes
        capture.push(0); // hardware type, 1-byte layout
        capture.extend_from_slice(&[
            0xB0, 0x31, // write
            0x01, 0xF3, 0x01, // 500 ms
            0xB0, 0x11, // write
        ]);
        std::fs::write(&dro_path, &capture).unwrap();

        let dro = Dro::from_file(&dro_path).unwrap();
        let options = ConvertOptions {
            rate: 560,
            imf_type: ImfType::Type1,
        };
        let music = convert_dro_to_imf(&dro, &options).unwrap();
        music.write_to_file(&imf_path).unwrap();

        let bytes = std::fs::read(&imf_path).unwrap();
        assert_eq!(
            bytes,
            [
                0x0C, 0x00, // event stream length: 12
                0x00, 0x00, 0x00, 0x00, // null pair
                0xB0, 0x31, 0x18, 0x01, // write, then 280 ticks
                0xB0, 0x11, 0x00, 0x00, // write, terminating zero delay
            ]
        );

        // converting the same capture again produces identical bytes
        let again = convert_dro_to_imf(&dro, &options).unwrap();
        let mut out = Vec::new();
        again.write_to_vec(&mut out).unwrap();
        assert_eq!(out, bytes);
    }
}
