//! GeoPackage geometry blobs.
//!
//! A GeoPackage stores each geometry as a small binary header followed by
//! standard WKB:
//!
//! ```text
//! magic "GP" | version u8 | flags u8 | srs_id i32 | envelope (0/32/48/64 bytes) | WKB
//! ```
//!
//! Flags bit 0 is the header byte order (1 = little endian), bits 1-3 the
//! envelope indicator, bit 4 the empty-geometry flag. Blobs read from an
//! existing container are kept as opaque bytes; only the header is decoded.

use serde::{Deserialize, Serialize};

use crate::error::{EtlError, EtlResult};

const MAGIC: [u8; 2] = *b"GP";
const HEADER_LEN: usize = 8;

/// Decoded GeoPackage binary header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryHeader {
    pub version: u8,
    pub little_endian: bool,
    pub envelope_len: usize,
    pub empty: bool,
    pub srs_id: i32,
}

impl GeometryHeader {
    /// Parse the fixed part of a GeoPackage geometry header.
    pub fn parse(blob: &[u8]) -> EtlResult<Self> {
        if blob.len() < HEADER_LEN {
            return Err(EtlError::InvalidGeometry(format!(
                "blob too short: {} bytes",
                blob.len()
            )));
        }
        if blob[0..2] != MAGIC {
            return Err(EtlError::InvalidGeometry("missing GP magic".to_string()));
        }

        let flags = blob[3];
        let little_endian = flags & 0x01 == 1;
        let envelope_len = match (flags >> 1) & 0x07 {
            0 => 0,
            1 => 32,
            2 | 3 => 48,
            4 => 64,
            other => {
                return Err(EtlError::InvalidGeometry(format!(
                    "invalid envelope indicator {}",
                    other
                )))
            }
        };

        let srs_bytes = [blob[4], blob[5], blob[6], blob[7]];
        let srs_id = if little_endian {
            i32::from_le_bytes(srs_bytes)
        } else {
            i32::from_be_bytes(srs_bytes)
        };

        if blob.len() < HEADER_LEN + envelope_len {
            return Err(EtlError::InvalidGeometry("truncated envelope".to_string()));
        }

        Ok(Self {
            version: blob[2],
            little_endian,
            envelope_len,
            empty: flags & 0x10 != 0,
            srs_id,
        })
    }

    /// Offset of the WKB payload within the blob.
    pub fn wkb_offset(&self) -> usize {
        HEADER_LEN + self.envelope_len
    }
}

/// A geometry stored in GeoPackage binary form.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    blob: Vec<u8>,
}

impl Geometry {
    /// Wrap an existing GeoPackage blob after validating its header.
    pub fn from_gpkg_blob(blob: Vec<u8>) -> EtlResult<Self> {
        GeometryHeader::parse(&blob)?;
        Ok(Self { blob })
    }

    /// Encode a 2D point.
    pub fn point(x: f64, y: f64, srs_id: i32) -> Self {
        let mut blob = Vec::with_capacity(HEADER_LEN + 21);
        blob.extend_from_slice(&MAGIC);
        blob.push(0); // version
        blob.push(0x01); // little endian, no envelope
        blob.extend_from_slice(&srs_id.to_le_bytes());

        blob.push(0x01);
        blob.extend_from_slice(&1u32.to_le_bytes());
        blob.extend_from_slice(&x.to_le_bytes());
        blob.extend_from_slice(&y.to_le_bytes());

        Self { blob }
    }

    /// Origin point used where a row has no real location.
    pub fn placeholder(srs_id: i32) -> Self {
        Self::point(0.0, 0.0, srs_id)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.blob
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.blob
    }

    pub fn header(&self) -> GeometryHeader {
        // Validated at construction.
        GeometryHeader::parse(&self.blob).unwrap_or(GeometryHeader {
            version: 0,
            little_endian: true,
            envelope_len: 0,
            empty: true,
            srs_id: -1,
        })
    }

    pub fn srs_id(&self) -> Option<i32> {
        GeometryHeader::parse(&self.blob).ok().map(|h| h.srs_id)
    }

    /// The WKB payload following the header.
    pub fn wkb(&self) -> &[u8] {
        let offset = self.header().wkb_offset().min(self.blob.len());
        &self.blob[offset..]
    }

    /// WKB geometry type code, with Z/M/ZM variants folded to the 2D code.
    pub fn wkb_type(&self) -> Option<u32> {
        let wkb = self.wkb();
        if wkb.len() < 5 {
            return None;
        }
        let bytes = [wkb[1], wkb[2], wkb[3], wkb[4]];
        let raw = if wkb[0] == 1 {
            u32::from_le_bytes(bytes)
        } else {
            u32::from_be_bytes(bytes)
        };
        // Strip EWKB flag bits, then ISO dimensional offsets.
        Some((raw & 0x0FFF_FFFF) % 1000)
    }

    /// GeoPackage geometry type name for this blob.
    pub fn geometry_type_name(&self) -> Option<&'static str> {
        let name = match self.wkb_type()? {
            1 => "POINT",
            2 => "LINESTRING",
            3 => "POLYGON",
            4 => "MULTIPOINT",
            5 => "MULTILINESTRING",
            6 => "MULTIPOLYGON",
            7 => "GEOMETRYCOLLECTION",
            _ => "GEOMETRY",
        };
        Some(name)
    }

    /// Decode a 2D point payload, if this is one.
    pub fn as_point(&self) -> Option<(f64, f64)> {
        if self.wkb_type()? != 1 {
            return None;
        }
        let wkb = self.wkb();
        if wkb.len() < 21 {
            return None;
        }
        let read = |start: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&wkb[start..start + 8]);
            if wkb[0] == 1 {
                f64::from_le_bytes(buf)
            } else {
                f64::from_be_bytes(buf)
            }
        };
        Some((read(5), read(13)))
    }
}

/// A row of `gpkg_spatial_ref_sys`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialRef {
    pub srs_name: String,
    pub srs_id: i32,
    pub organization: String,
    pub organization_coordsys_id: i32,
    pub definition: String,
    pub description: Option<String>,
}

impl SpatialRef {
    /// WGS 84 geographic, mandatory in every GeoPackage.
    pub fn wgs84() -> Self {
        Self {
            srs_name: "WGS 84 geodetic".to_string(),
            srs_id: 4326,
            organization: "EPSG".to_string(),
            organization_coordsys_id: 4326,
            definition: concat!(
                "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563,",
                "AUTHORITY[\"EPSG\",\"7030\"]],AUTHORITY[\"EPSG\",\"6326\"]],PRIMEM[\"Greenwich\",0,",
                "AUTHORITY[\"EPSG\",\"8901\"]],UNIT[\"degree\",0.0174532925199433,",
                "AUTHORITY[\"EPSG\",\"9122\"]],AUTHORITY[\"EPSG\",\"4326\"]]"
            )
            .to_string(),
            description: Some("longitude/latitude coordinates in decimal degrees on the WGS 84 spheroid".to_string()),
        }
    }

    pub fn undefined_cartesian() -> Self {
        Self {
            srs_name: "Undefined cartesian SRS".to_string(),
            srs_id: -1,
            organization: "NONE".to_string(),
            organization_coordsys_id: -1,
            definition: "undefined".to_string(),
            description: Some("undefined cartesian coordinate reference system".to_string()),
        }
    }

    pub fn undefined_geographic() -> Self {
        Self {
            srs_name: "Undefined geographic SRS".to_string(),
            srs_id: 0,
            organization: "NONE".to_string(),
            organization_coordsys_id: 0,
            definition: "undefined".to_string(),
            description: Some("undefined geographic coordinate reference system".to_string()),
        }
    }

    /// The three rows every GeoPackage must carry.
    pub fn mandatory() -> [SpatialRef; 3] {
        [Self::wgs84(), Self::undefined_cartesian(), Self::undefined_geographic()]
    }
}
