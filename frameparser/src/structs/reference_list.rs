//! Reference frame bookkeeping for inter-predicted video.
//!
//! Theora predicts from two pictures: the most recent decoded frame
//! (slot 0) and the last intra frame, the golden frame (slot 1).

use std::sync::mpsc::Sender;

use log::trace;

use crate::utils::errors::ReferenceListError;

pub const REFERENCE_SLOT: usize = 0;
pub const GOLDEN_SLOT: usize = 1;
pub const MAX_REFERENCE_FRAMES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureType {
    Intra,
    Inter,
}

impl PictureType {
    pub fn is_independent(self) -> bool {
        self == PictureType::Intra
    }
}

/// Request to free a decoded frame that no longer serves as a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseRequest {
    pub decode_frame_index: u32,
}

/// Receiver of reference release requests. Sending must not block.
pub trait ReferenceReleaser {
    fn release_reference_frame(&mut self, decode_frame_index: u32);
}

impl ReferenceReleaser for Sender<ReleaseRequest> {
    fn release_reference_frame(&mut self, decode_frame_index: u32) {
        // A hung-up receiver has nothing left to free.
        let _ = self.send(ReleaseRequest { decode_frame_index });
    }
}

impl ReferenceReleaser for Vec<u32> {
    fn release_reference_frame(&mut self, decode_frame_index: u32) {
        self.push(decode_frame_index);
    }
}

/// Drops release requests, for consumers that manage no frame buffers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardReleases;

impl ReferenceReleaser for DiscardReleases {
    fn release_reference_frame(&mut self, decode_frame_index: u32) {
        trace!("Reference frame {decode_frame_index} no longer needed");
    }
}

/// Where each reference of a frame about to be decoded comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSource {
    /// The frame being decoded, for the first intra frame of a chain.
    CurrentFrame,
    Frame(u32),
}

/// Reference and golden inputs for one decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeReferences {
    pub reference: ReferenceSource,
    pub golden: ReferenceSource,
}

impl DecodeReferences {
    pub fn resolve(&self, current: u32) -> [u32; MAX_REFERENCE_FRAMES] {
        let index = |source: ReferenceSource| match source {
            ReferenceSource::CurrentFrame => current,
            ReferenceSource::Frame(index) => index,
        };
        [index(self.reference), index(self.golden)]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceFrameList {
    entry_count: usize,
    entry_indices: [u32; MAX_REFERENCE_FRAMES],
}

impl ReferenceFrameList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    pub fn entries(&self) -> &[u32] {
        &self.entry_indices[..self.entry_count]
    }

    pub fn reference(&self) -> Option<u32> {
        self.entries().get(REFERENCE_SLOT).copied()
    }

    pub fn golden(&self) -> Option<u32> {
        self.entries().get(GOLDEN_SLOT).copied()
    }

    /// Selects the references for decoding a frame of `picture_type`.
    pub fn prepare_for_decode(
        &self,
        picture_type: PictureType,
    ) -> Result<DecodeReferences, ReferenceListError> {
        match picture_type {
            PictureType::Inter if self.entry_count == 0 => {
                Err(ReferenceListError::InsufficientReferenceFrames {
                    available: 0,
                    required: 1,
                })
            }
            PictureType::Intra if self.entry_count == 0 => Ok(DecodeReferences {
                reference: ReferenceSource::CurrentFrame,
                golden: ReferenceSource::CurrentFrame,
            }),
            _ => {
                let reference = self.entry_indices[REFERENCE_SLOT];
                // With a single entry the golden slot still holds the reference.
                let golden = self.entry_indices[GOLDEN_SLOT];
                Ok(DecodeReferences {
                    reference: ReferenceSource::Frame(reference),
                    golden: ReferenceSource::Frame(golden),
                })
            }
        }
    }

    /// Records a decoded frame, releasing the references it displaces.
    pub fn update_after_decode<R: ReferenceReleaser + ?Sized>(
        &mut self,
        picture_type: PictureType,
        decode_frame_index: u32,
        releaser: &mut R,
    ) {
        if self.entry_count == 0 {
            self.entry_count = 1;
            self.entry_indices = [decode_frame_index; MAX_REFERENCE_FRAMES];
        } else if self.entry_indices[REFERENCE_SLOT] != self.entry_indices[GOLDEN_SLOT] {
            trace!(
                "Releasing reference frame {}",
                self.entry_indices[REFERENCE_SLOT]
            );
            releaser.release_reference_frame(self.entry_indices[REFERENCE_SLOT]);
        }

        self.entry_indices[REFERENCE_SLOT] = decode_frame_index;

        if picture_type == PictureType::Intra {
            if self.entry_count == 1 {
                self.entry_count = 2;
            } else {
                trace!(
                    "Releasing golden frame {}",
                    self.entry_indices[GOLDEN_SLOT]
                );
                releaser.release_reference_frame(self.entry_indices[GOLDEN_SLOT]);
            }
            self.entry_indices[GOLDEN_SLOT] = decode_frame_index;
        }
    }

    /// Releases every held frame and empties the list.
    pub fn reset<R: ReferenceReleaser + ?Sized>(&mut self, releaser: &mut R) {
        if self.entry_count > 0 {
            releaser.release_reference_frame(self.entry_indices[REFERENCE_SLOT]);
            if self.entry_indices[GOLDEN_SLOT] != self.entry_indices[REFERENCE_SLOT] {
                releaser.release_reference_frame(self.entry_indices[GOLDEN_SLOT]);
            }
        }
        *self = Self::default();
    }
}
