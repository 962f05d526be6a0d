//! Implementation of the id Software Music Format.
//!
//! An IMF song is a flat stream of register/value/delay records played
//! against a fixed-rate timer. Two container variants exist: Type-0
//! carries nothing but the records, Type-1 prefixes the stream with its
//! length in bytes and may append metadata tags after it.

use snafu::{ResultExt, Snafu};

#[cfg(feature = "std")]
use std::path::Path;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::data_types::{TagError, TagString};
#[cfg(feature = "std")]
use crate::registers::is_valid_opl_register;

/// An error reading or writing an IMF file
#[cfg(feature = "std")]
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read the file
    ReadFile { source: std::io::Error },
    /// Failed to write the file
    WriteFile { source: std::io::Error },
    /// Failed to parse IMF data
    ParseImf { source: ParseError },
}

/// An error reading or writing an IMF file
#[cfg(not(feature = "std"))]
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// Failed to parse IMF data
    ParseImf { source: ParseError },
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Error parsing an IMF file or IMF file component
#[derive(Debug, PartialEq, Snafu)]
#[non_exhaustive]
pub enum ParseError {
    /// Truncated input while reading {context}
    TruncatedInput { context: &'static str },
    /// Invalid tag string
    InvalidTag { source: TagError },
}

/// IMF container variant
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ImfType {
    /// No length prefix; 4 bytes of zero padding instead
    /// (Commander Keen, Duke Nukem II)
    #[default]
    Type0,
    /// Leading 16-bit event stream length,
    /// optionally followed by metadata tags (Wolfenstein 3D)
    Type1,
}

impl core::fmt::Display for ImfType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ImfType::Type0 => f.write_str("Type-0"),
            ImfType::Type1 => f.write_str("Type-1"),
        }
    }
}

/// A register write paired with the time to hold afterwards.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ImfEvent {
    /// The OPL register to write to
    pub register: u8,
    /// The value to write to the register
    pub value: u8,
    /// Ticks to wait after this write,
    /// in the playback rate of the song
    pub delay: u16,
}

impl ImfEvent {
    /// Encoded size of one event in bytes
    pub const SIZE: usize = 4;

    pub fn parse(input: &[u8]) -> Result<(Self, &[u8]), ParseError> {
        if input.len() < Self::SIZE {
            return Err(ParseError::TruncatedInput { context: "event" });
        }

        let register = input[0];
        let value = input[1];
        let delay = u16::from_le_bytes(input[2..4].try_into().unwrap());

        Ok((
            Self {
                register,
                value,
                delay,
            },
            &input[Self::SIZE..],
        ))
    }

    fn encoded(&self) -> [u8; Self::SIZE] {
        let delay = self.delay.to_le_bytes();
        [self.register, self.value, delay[0], delay[1]]
    }
}

/// Metadata tags appended to a Type-1 file.
///
/// All three fields travel together; a file carries either the full
/// block or no tags at all.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ImfTags {
    pub title: TagString,
    pub composer: TagString,
    pub remarks: TagString,
}

impl ImfTags {
    /// Byte announcing a tag block after the event stream
    pub const SIGNATURE: u8 = 0x1A;

    /// Identifier of the program that wrote the tags
    /// (not normally user-visible)
    pub const WRITER_ID: [u8; 9] = *b"DRO2IMF\0\0";

    pub fn parse(input: &[u8]) -> Result<(Self, &[u8]), ParseError> {
        let (title, input) = parse_tag_string(input)?;
        let (composer, input) = parse_tag_string(input)?;
        let (remarks, input) = parse_tag_string(input)?;

        // the writer identifier that follows is informational only
        let input = input.get(Self::WRITER_ID.len()..).unwrap_or(&[]);

        Ok((
            Self {
                title,
                composer,
                remarks,
            },
            input,
        ))
    }

    #[cfg(feature = "std")]
    pub fn write_to(&self, mut writer: impl std::io::Write) -> std::io::Result<()> {
        writer.write_all(&[Self::SIGNATURE])?;
        self.title.write_to(&mut writer)?;
        self.composer.write_to(&mut writer)?;
        self.remarks.write_to(&mut writer)?;
        writer.write_all(&Self::WRITER_ID)
    }
}

fn parse_tag_string(input: &[u8]) -> Result<(TagString, &[u8]), ParseError> {
    let end = input
        .iter()
        .position(|&b| b == 0)
        .ok_or(ParseError::TruncatedInput {
            context: "tag string",
        })?;
    let tag = TagString::new(&input[..end]).context(InvalidTagSnafu)?;
    Ok((tag, &input[end + 1..]))
}

/// A complete in-memory representation of an IMF song.
///
/// The event list carries the whole observable stream: the leading
/// null register/value pair whose delay positions the first real
/// write, every register write with the delay that follows it, and a
/// zero delay on the final event as the terminating marker.
#[derive(Debug)]
pub struct ImfMusic {
    pub imf_type: ImfType,
    pub events: Vec<ImfEvent>,
    pub tags: Option<ImfTags>,
}

impl ImfMusic {
    /// Create a new empty song in the given container variant
    pub fn new(imf_type: ImfType) -> Self {
        ImfMusic {
            imf_type,
            events: Vec::new(),
            tags: None,
        }
    }

    #[cfg(feature = "std")]
    pub fn from_file(file: impl AsRef<Path>, imf_type: ImfType) -> Result<Self> {
        let bytes = std::fs::read(file).context(ReadFileSnafu)?;
        Self::parse(&bytes, imf_type)
    }

    /// Parse an IMF byte stream.
    ///
    /// The container variant cannot be sniffed reliably,
    /// so the caller states it.
    pub fn parse(input: &[u8], imf_type: ImfType) -> Result<Self> {
        let (stream, trailer) = match imf_type {
            ImfType::Type0 => {
                if input.len() < 4 {
                    return Err(ParseError::TruncatedInput { context: "padding" })
                        .context(ParseImfSnafu);
                }
                // no length prefix; the stream runs to the end of the file
                (&input[4..], &[][..])
            }
            ImfType::Type1 => {
                if input.len() < 2 {
                    return Err(ParseError::TruncatedInput {
                        context: "length prefix",
                    })
                    .context(ParseImfSnafu);
                }
                let length = u16::from_le_bytes(input[0..2].try_into().unwrap()) as usize;
                let rest = &input[2..];
                if rest.len() < length {
                    return Err(ParseError::TruncatedInput {
                        context: "event stream",
                    })
                    .context(ParseImfSnafu);
                }
                rest.split_at(length)
            }
        };

        let mut events = Vec::new();
        let mut stream = stream;
        while !stream.is_empty() {
            let (event, rest) = ImfEvent::parse(stream).context(ParseImfSnafu)?;
            #[cfg(feature = "std")]
            if event.register != 0 && !is_valid_opl_register(event.register) {
                eprintln!("Invalid register in event #{}: {:?}", events.len(), event);
            }
            events.push(event);
            stream = rest;
        }

        let tags = match trailer.split_first() {
            Some((&ImfTags::SIGNATURE, rest)) => {
                let (tags, _) = ImfTags::parse(rest).context(ParseImfSnafu)?;
                Some(tags)
            }
            _ => None,
        };

        Ok(Self {
            imf_type,
            events,
            tags,
        })
    }

    #[cfg(feature = "std")]
    pub fn write_to_file(&self, file: impl AsRef<Path>) -> Result<()> {
        use std::io::BufWriter;
        let writer = BufWriter::new(std::fs::File::create(file).context(WriteFileSnafu)?);
        self.write_to(writer)
    }

    /// Write the complete container.
    ///
    /// The Type-1 length prefix is computed from the event count up
    /// front, so a single forward pass produces the same bytes as a
    /// placeholder-then-patch writer would. The prefix is 16-bit;
    /// event streams past 64 KiB wrap it, as the historical tools did.
    #[cfg(feature = "std")]
    pub fn write_to(&self, writer: impl std::io::Write) -> Result<()> {
        let mut writer = writer;

        match self.imf_type {
            ImfType::Type1 => {
                let length = self.calculate_stream_bytes() as u16;
                writer
                    .write_all(&length.to_le_bytes())
                    .context(WriteFileSnafu)?;
            }
            ImfType::Type0 => {
                // padding only; Type-0 files have no length prefix
                writer.write_all(&[0; 4]).context(WriteFileSnafu)?;
            }
        }

        for event in &self.events {
            writer.write_all(&event.encoded()).context(WriteFileSnafu)?;
        }

        if let Some(tags) = &self.tags {
            match self.imf_type {
                ImfType::Type1 => tags.write_to(&mut writer).context(WriteFileSnafu)?,
                ImfType::Type0 => {
                    // without a length prefix, trailing tag data would
                    // be read back as events
                    eprintln!(
                        "Warning: The selected IMF file format is Type-0. Thus, IMF tags are ignored."
                    );
                }
            }
        }

        Ok(())
    }

    #[cfg(feature = "std")]
    pub fn write_to_vec(&self, out: &mut Vec<u8>) -> Result<()> {
        self.write_to(out)?;
        Ok(())
    }

    /// Size of the event stream in bytes, excluding prefix and tags.
    pub fn calculate_stream_bytes(&self) -> u32 {
        (self.events.len() * ImfEvent::SIZE) as u32
    }
}
