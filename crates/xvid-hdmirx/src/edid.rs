//! EDID block sets.
//!
//! The receiver presents either user supplied blocks (from `set_edid` or the firmware file read at
//! bind) or the built-in default set. Exactly one set is active at a time.

use serde::Serialize;

use crate::error::HdmiRxError;

pub const EDID_BLOCK_SIZE: usize = 128;

/// Upper bound on `edid-ram-size`, in blocks.
pub const EDID_BLOCKS_MAX: u32 = 10;

/// Firmware file consulted at bind for a board specific EDID.
pub const EDID_FIRMWARE: &str = "xilinx/xilinx-hdmi-rx-edid.bin";

/// Built-in EDID: base block plus one CEA-861 extension.
pub const DEFAULT_EDID: [u8; 2 * EDID_BLOCK_SIZE] = [
    0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x61, 0x98, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12,
    0x1f, 0x19, 0x01, 0x03, 0x80, 0x59, 0x32, 0x78, 0x0a, 0xee, 0x91, 0xa3, 0x54, 0x4c, 0x99, 0x26,
    0x0f, 0x50, 0x54, 0x21, 0x08, 0x00, 0x71, 0x4f, 0x81, 0xc0, 0x81, 0x00, 0x81, 0x80, 0x95, 0x00,
    0xa9, 0xc0, 0xb3, 0x00, 0x01, 0x01, 0x02, 0x3a, 0x80, 0x18, 0x71, 0x38, 0x2d, 0x40, 0x58, 0x2c,
    0x45, 0x00, 0x20, 0xc2, 0x31, 0x00, 0x00, 0x1e, 0x00, 0x00, 0x00, 0xfc, 0x00, 0x58, 0x49, 0x4c,
    0x49, 0x4e, 0x58, 0x20, 0x48, 0x44, 0x4d, 0x49, 0x0a, 0x20, 0x00, 0x00, 0x00, 0x11, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x11,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x0c,
    0x02, 0x03, 0x34, 0x71, 0x57, 0x61, 0x10, 0x1f, 0x04, 0x13, 0x05, 0x14, 0x20, 0x21, 0x22, 0x5d,
    0x5e, 0x5f, 0x60, 0x65, 0x66, 0x62, 0x63, 0x64, 0x07, 0x16, 0x03, 0x12, 0x23, 0x09, 0x07, 0x07,
    0x67, 0x03, 0x0c, 0x00, 0x10, 0x00, 0x78, 0x3c, 0xe3, 0x0f, 0x01, 0xe0, 0x67, 0xd8, 0x5d, 0xc4,
    0x01, 0x78, 0x80, 0x07, 0x02, 0x3a, 0x80, 0x18, 0x71, 0x38, 0x2d, 0x40, 0x58, 0x2c, 0x45, 0x00,
    0x20, 0xc2, 0x31, 0x00, 0x00, 0x1e, 0x08, 0xe8, 0x00, 0x30, 0xf2, 0x70, 0x5a, 0x80, 0xb0, 0x58,
    0x8a, 0x00, 0x20, 0xc2, 0x31, 0x00, 0x00, 0x1e, 0x04, 0x74, 0x00, 0x30, 0xf2, 0x70, 0x5a, 0x80,
    0xb0, 0x58, 0x8a, 0x00, 0x20, 0x52, 0x31, 0x00, 0x00, 0x1e, 0x66, 0x21, 0x56, 0xaa, 0x51, 0x00,
    0x1e, 0x30, 0x46, 0x8f, 0x33, 0x00, 0x50, 0x1d, 0x74, 0x00, 0x00, 0x1e, 0x00, 0x00, 0x00, 0x2e,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdidSource {
    BuiltIn,
    Firmware,
    User,
}

/// Result of an EDID read. `data` is empty for a size query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdidData {
    pub blocks: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct EdidStore {
    blocks_max: u32,
    user: Option<(EdidSource, Vec<u8>)>,
}

impl EdidStore {
    pub fn new(blocks_max: u32) -> Self {
        Self {
            blocks_max,
            user: None,
        }
    }

    pub fn blocks_max(&self) -> u32 {
        self.blocks_max
    }

    /// Checks that `data` is a whole number of blocks and fits the EDID RAM. Returns the
    /// block count.
    pub fn check_len(data: &[u8], blocks_max: u32) -> Result<u32, HdmiRxError> {
        if data.len() % EDID_BLOCK_SIZE != 0 {
            return Err(HdmiRxError::InvalidArgument(
                "edid length is not a multiple of 128 bytes",
            ));
        }
        let blocks = u32::try_from(data.len() / EDID_BLOCK_SIZE)
            .map_err(|_| HdmiRxError::TooManyBlocks { max: blocks_max })?;
        if blocks > blocks_max {
            return Err(HdmiRxError::TooManyBlocks { max: blocks_max });
        }
        Ok(blocks)
    }

    /// Validates a firmware image: `n * 128` bytes with `1 <= n <= blocks_max`.
    pub fn check_firmware(data: &[u8], blocks_max: u32) -> Result<u32, HdmiRxError> {
        if data.is_empty() || data.len() % EDID_BLOCK_SIZE != 0 {
            return Err(HdmiRxError::InvalidEdid("length must be n * 128 bytes"));
        }
        match Self::check_len(data, blocks_max) {
            Ok(blocks) => Ok(blocks),
            Err(_) => Err(HdmiRxError::InvalidEdid("more blocks than the edid ram holds")),
        }
    }

    pub fn source(&self) -> EdidSource {
        self.user
            .as_ref()
            .map_or(EdidSource::BuiltIn, |(source, _)| *source)
    }

    /// The active block set.
    pub fn active(&self) -> &[u8] {
        match &self.user {
            Some((_, data)) => data,
            None => &DEFAULT_EDID,
        }
    }

    pub fn active_blocks(&self) -> u32 {
        (self.active().len() / EDID_BLOCK_SIZE) as u32
    }

    /// Copies out up to `count` blocks of the active set. `count == 0` only reports the size.
    pub fn read(&self, count: u32) -> EdidData {
        let blocks = self.active_blocks();
        let copy = count.min(blocks) as usize * EDID_BLOCK_SIZE;
        EdidData {
            blocks,
            data: self.active()[..copy].to_vec(),
        }
    }

    /// Makes `data` the active set. An empty set reverts to the built-in blocks.
    pub(crate) fn replace(&mut self, source: EdidSource, data: &[u8]) {
        self.user = if data.is_empty() {
            None
        } else {
            Some((source, data.to_vec()))
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn checksum(block: &[u8]) -> u8 {
        block.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
    }

    #[test]
    fn default_edid_blocks_checksum_to_zero() {
        assert_eq!(&DEFAULT_EDID[..8], &[0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00]);
        for block in DEFAULT_EDID.chunks(EDID_BLOCK_SIZE) {
            assert_eq!(checksum(block), 0);
        }
        // Extension count in the base block.
        assert_eq!(DEFAULT_EDID[126], 1);
    }

    #[test]
    fn read_reports_size_without_data_for_zero_count() {
        let store = EdidStore::new(2);
        let out = store.read(0);
        assert_eq!(out.blocks, 2);
        assert!(out.data.is_empty());
        let out = store.read(1);
        assert_eq!(out.data, DEFAULT_EDID[..128].to_vec());
        let out = store.read(8);
        assert_eq!(out.data.len(), 256);
    }

    #[test]
    fn empty_replace_reverts_to_built_in() {
        let mut store = EdidStore::new(4);
        store.replace(EdidSource::User, &[0xaa; 3 * EDID_BLOCK_SIZE]);
        assert_eq!(store.source(), EdidSource::User);
        assert_eq!(store.active_blocks(), 3);
        store.replace(EdidSource::User, &[]);
        assert_eq!(store.source(), EdidSource::BuiltIn);
        assert_eq!(store.active(), &DEFAULT_EDID[..]);
    }

    #[test]
    fn firmware_must_hold_at_least_one_block() {
        assert!(matches!(
            EdidStore::check_firmware(&[], 2),
            Err(HdmiRxError::InvalidEdid(_))
        ));
        assert!(matches!(
            EdidStore::check_firmware(&[0; 3 * EDID_BLOCK_SIZE], 2),
            Err(HdmiRxError::InvalidEdid(_))
        ));
        assert_eq!(EdidStore::check_firmware(&[0; EDID_BLOCK_SIZE], 2).unwrap(), 1);
    }

    proptest! {
        #[test]
        fn length_check_accepts_exactly_whole_blocks_within_limit(
            len in 0usize..(12 * EDID_BLOCK_SIZE),
            max in 1u32..=EDID_BLOCKS_MAX,
        ) {
            let data = vec![0u8; len];
            match EdidStore::check_len(&data, max) {
                Ok(blocks) => {
                    prop_assert_eq!(len % EDID_BLOCK_SIZE, 0);
                    prop_assert_eq!(blocks as usize * EDID_BLOCK_SIZE, len);
                    prop_assert!(blocks <= max);
                }
                Err(HdmiRxError::TooManyBlocks { max: reported }) => {
                    prop_assert_eq!(reported, max);
                    prop_assert!(len / EDID_BLOCK_SIZE > max as usize);
                    prop_assert_eq!(len % EDID_BLOCK_SIZE, 0);
                }
                Err(HdmiRxError::InvalidArgument(_)) => {
                    prop_assert_ne!(len % EDID_BLOCK_SIZE, 0);
                }
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
        }
    }
}
