// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Image file header.
//!
//! A saved image is a linear serialisation of the startup object graph. The
//! header carries the sentinels that must match the restoring build exactly;
//! any mismatch aborts startup rather than risking a misinterpreted heap.

use core::fmt;

/// Magic number identifying a Roxa image file ("ROXAIMG" + version nibble).
pub const IMAGE_MAGIC: u64 = 0x524F_5841_494D_4701;

/// Image format version. Bumped whenever the object encoding changes.
pub const IMAGE_VERSION: u32 = 1;

/// Endianness tag for little-endian images.
pub const ENDIAN_LITTLE: u8 = 0x4C;

/// Endianness tag for big-endian images.
pub const ENDIAN_BIG: u8 = 0x42;

/// Reasons an image header can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMismatch {
    /// The magic number is wrong (not an image, or truncated).
    BadMagic,
    /// The format version differs from the running build.
    Version,
    /// The pointer width differs from the running build.
    PointerWidth,
    /// The byte order differs from the running build.
    Endianness,
    /// The class tag table digest differs from the running build.
    ClassTable,
}

impl fmt::Display for ImageMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic => write!(f, "not a Roxa image file"),
            Self::Version => write!(f, "image format version mismatch"),
            Self::PointerWidth => write!(f, "image pointer width mismatch"),
            Self::Endianness => write!(f, "image byte order mismatch"),
            Self::ClassTable => write!(f, "image class table mismatch"),
        }
    }
}

/// The fixed-layout control block at the start of an image file.
///
/// `image_length` covers the object data following the header;
/// `save_array_offset` locates the root table within that data.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageHeader {
    /// Must equal [`IMAGE_MAGIC`].
    pub magic: u64,
    /// Must equal [`IMAGE_VERSION`].
    pub version: u32,
    /// Pointer width of the saving build, in bytes.
    pub pointer_width: u8,
    /// [`ENDIAN_LITTLE`] or [`ENDIAN_BIG`].
    pub endianness: u8,
    /// Reserved, written as zero.
    pub reserved: u16,
    /// Digest over the class tag table of the saving build.
    pub class_digest: u64,
    /// Byte length of the object data after the header.
    pub image_length: u64,
    /// Offset of the save array (root table) within the object data.
    pub save_array_offset: u64,
}

impl ImageHeader {
    /// Size of the encoded header in bytes.
    pub const SIZE: usize = 40;

    /// Build a header for the current platform.
    #[must_use]
    pub const fn current(class_digest: u64, image_length: u64, save_array_offset: u64) -> Self {
        Self {
            magic: IMAGE_MAGIC,
            version: IMAGE_VERSION,
            pointer_width: core::mem::size_of::<usize>() as u8,
            endianness: if cfg!(target_endian = "little") {
                ENDIAN_LITTLE
            } else {
                ENDIAN_BIG
            },
            reserved: 0,
            class_digest,
            image_length,
            save_array_offset,
        }
    }

    /// Check the header against the running build.
    ///
    /// # Errors
    ///
    /// Returns the first sentinel that fails to match.
    pub fn validate(&self, class_digest: u64) -> Result<(), ImageMismatch> {
        if self.magic != IMAGE_MAGIC {
            return Err(ImageMismatch::BadMagic);
        }
        if self.version != IMAGE_VERSION {
            return Err(ImageMismatch::Version);
        }
        if self.pointer_width != core::mem::size_of::<usize>() as u8 {
            return Err(ImageMismatch::PointerWidth);
        }
        let expected = if cfg!(target_endian = "little") {
            ENDIAN_LITTLE
        } else {
            ENDIAN_BIG
        };
        if self.endianness != expected {
            return Err(ImageMismatch::Endianness);
        }
        if self.class_digest != class_digest {
            return Err(ImageMismatch::ClassTable);
        }
        Ok(())
    }

    /// Encode to the on-disk byte layout (always little-endian fields).
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..8].copy_from_slice(&self.magic.to_le_bytes());
        out[8..12].copy_from_slice(&self.version.to_le_bytes());
        out[12] = self.pointer_width;
        out[13] = self.endianness;
        out[14..16].copy_from_slice(&self.reserved.to_le_bytes());
        out[16..24].copy_from_slice(&self.class_digest.to_le_bytes());
        out[24..32].copy_from_slice(&self.image_length.to_le_bytes());
        out[32..40].copy_from_slice(&self.save_array_offset.to_le_bytes());
        out
    }

    /// Decode from the on-disk byte layout.
    ///
    /// Returns `None` when fewer than [`Self::SIZE`] bytes are available.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        let u64_at = |at: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[at..at + 8]);
            u64::from_le_bytes(buf)
        };
        let magic = u64_at(0);
        let class_digest = u64_at(16);
        let image_length = u64_at(24);
        let save_array_offset = u64_at(32);
        let mut ver = [0u8; 4];
        ver.copy_from_slice(&bytes[8..12]);
        Some(Self {
            magic,
            version: u32::from_le_bytes(ver),
            pointer_width: bytes[12],
            endianness: bytes[13],
            reserved: u16::from_le_bytes([bytes[14], bytes[15]]),
            class_digest,
            image_length,
            save_array_offset,
        })
    }
}
