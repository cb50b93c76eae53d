//! Encode and decode `GSLA` delta-frame animations.
//!
//! A `GSLA` file stores an animation as a first frame plus a list of changes. Each
//! frame is an opcode stream that rebuilds a canvas in place: bytes are skipped when
//! they already match, written literally, or copied from elsewhere in the canvas. The
//! previous frame therefore acts as the compression dictionary for the next one.
//!
//! Streams are laid out so that no command ever straddles a 64KB bank of the file,
//! which lets a player on bank-addressed hardware walk a stream with a 16-bit pointer.
//!
//! ```
//! # use gsla::{Decoder, Encoder};
//! let mut frames = vec![vec![0u8; 32000]; 3];
//! frames[1][100..200].copy_from_slice(&[0x44; 100]);
//! frames[2][5000..5004].copy_from_slice(b"GSLA");
//!
//! let file = Encoder::for_frames(&frames).encode_to_vec().unwrap();
//! let animation = Decoder::for_bytes(&file).decode().unwrap();
//!
//! assert_eq!(animation.frame_count(), 4);
//! assert_eq!(animation.frames(), &frames[..]);
//! ```

mod decode;
mod encode;
mod errors;
pub mod format;
pub mod opcode;

pub use decode::{decode, decode_frame, decode_stream, load, Animation, Decoder, FrameEnd};
pub use encode::{
    encode_delta_frame, encode_initial_frame, save, Encoder, EncoderSettings, FrameEncoder,
};
pub use errors::{DecodeError, GslaError};
pub use format::{gsla_info, CanvasGeometry, FileInfo, GslaHeader};
pub use opcode::{Opcode, Terminator};
