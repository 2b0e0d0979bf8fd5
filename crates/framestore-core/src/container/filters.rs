//! Compression filters mapped onto parquet writer properties.

use parquet::basic::{BrotliLevel, Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use super::error::{ContainerResult, InvalidFiltersSnafu};
use crate::config::Complib;

/// Compression applied to array and table payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    /// Compression library.
    pub complib: Complib,
    /// Compression level; 0 disables compression.
    pub complevel: u8,
}

impl Filters {
    /// Build filters from optional store/call settings.
    ///
    /// A level of zero or no settings at all yields `None`; a library
    /// without a level uses level 1; a level without a library uses zlib.
    pub fn from_options(complib: Option<Complib>, complevel: Option<u8>) -> Option<Self> {
        match (complib, complevel) {
            (None, None) | (_, Some(0)) => None,
            (lib, level) => Some(Filters {
                complib: lib.unwrap_or(Complib::Zlib),
                complevel: level.unwrap_or(1).min(9),
            }),
        }
    }

    fn compression(&self) -> ContainerResult<Compression> {
        let level = self.complevel;
        let context = || InvalidFiltersSnafu {
            complib: self.complib.to_string(),
            complevel: level,
        };
        Ok(match self.complib {
            Complib::Zlib | Complib::Gzip => {
                Compression::GZIP(GzipLevel::try_new(u32::from(level)).context(context())?)
            }
            Complib::Zstd => {
                Compression::ZSTD(ZstdLevel::try_new(i32::from(level)).context(context())?)
            }
            Complib::Brotli => {
                Compression::BROTLI(BrotliLevel::try_new(u32::from(level)).context(context())?)
            }
            Complib::Snappy => Compression::SNAPPY,
            Complib::Lz4 => Compression::LZ4_RAW,
        })
    }
}

/// Writer properties for a payload, honoring optional filters.
pub(crate) fn writer_properties(filters: Option<&Filters>) -> ContainerResult<WriterProperties> {
    let compression = match filters {
        Some(f) => f.compression()?,
        None => Compression::SNAPPY,
    };
    Ok(WriterProperties::builder()
        .set_compression(compression)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_zero_disables_filters() {
        assert_eq!(Filters::from_options(Some(Complib::Zstd), Some(0)), None);
        assert_eq!(Filters::from_options(None, None), None);
    }

    #[test]
    fn missing_parts_get_defaults() {
        assert_eq!(
            Filters::from_options(None, Some(5)),
            Some(Filters {
                complib: Complib::Zlib,
                complevel: 5
            })
        );
        assert_eq!(
            Filters::from_options(Some(Complib::Lz4), None),
            Some(Filters {
                complib: Complib::Lz4,
                complevel: 1
            })
        );
    }

    #[test]
    fn every_library_maps_to_a_codec() {
        for complib in [
            Complib::Zlib,
            Complib::Gzip,
            Complib::Zstd,
            Complib::Snappy,
            Complib::Lz4,
            Complib::Brotli,
        ] {
            let f = Filters {
                complib,
                complevel: 9,
            };
            assert!(writer_properties(Some(&f)).is_ok(), "{complib}");
        }
    }
}
