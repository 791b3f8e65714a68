//! Media domain types: container formats, video profiles, segments.

pub mod format;
pub mod profile;
pub mod segment;

pub use format::ContainerFormat;
pub use profile::{
    default_broadcast_profiles, parse_presets, preset_lookup, EncoderProfile, Gop,
    ProfileDescriptor, VideoProfile,
};
pub use segment::MediaSegment;
