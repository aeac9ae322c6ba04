/*!
Wire messages crossing the host/worker boundary.

Two categories, mirroring how hosts batch them:

- Structured messages ([`StructuredMessage`]) carry variable-size payloads
  (geometry buffers, config overlays) and flow rarely.
- Hot-path messages are flat `f32` arrays whose slot 0 is the kind tag, so the
  per-frame traffic (slide, teleport, raycasts, platform poses, and the
  outbound updates) needs no per-message structure.

Everything is a flat, copyable value; no message borrows host memory. The
decoder is strict: wrong length, unknown tag, or non-finite input drops the
packet. Outbound raycast updates are the one place NaN is meaningful: it is
the miss sentinel.
*/

use engine::{ConfigUpdate, EnvironmentHandle, EnvironmentKind, Vec3};
use thiserror::Error;

/// Kind tags for hot-path packets (slot 0 of every flat array).
pub mod tag {
    pub const SLIDE: f32 = 1.0;
    pub const TELEPORT: f32 = 2.0;
    pub const JUMP: f32 = 3.0;
    pub const UPDATE_KINEMATIC: f32 = 4.0;
    pub const PARABOLIC_RAYCAST: f32 = 5.0;
    pub const POSITION_UPDATE: f32 = 6.0;
    pub const RAYCAST_UPDATE: f32 = 7.0;
}

/// Why a packet was rejected by the decoder.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unknown packet kind tag")]
    UnknownKind,
    #[error("packet length does not match its kind")]
    BadLength,
    #[error("packet payload contains non-finite values")]
    NonFinite,
}

/// Structured host → worker messages.
#[derive(Clone, Debug)]
pub enum StructuredMessage {
    /// Place the player and start integrating.
    Init { position: [f32; 3] },
    /// Partial configuration overlay.
    Config(ConfigUpdate),
    /// Register an environment. Geometry is copied into the registry.
    AddEnvironment {
        handle: EnvironmentHandle,
        positions: Vec<f32>,
        indices: Option<Vec<u32>>,
        kind: EnvironmentKind,
        matrix: [f32; 16],
    },
    /// Drop an environment; unknown handles are ignored.
    RemoveEnvironment { handle: EnvironmentHandle },
}

/// Anything the host can send to the worker.
#[derive(Clone, Debug)]
pub enum HostMessage {
    Structured(StructuredMessage),
    /// A flat hot-path packet; see [`decode_command`].
    Hot(Vec<f32>),
}

/// Decoded hot-path host → worker commands.
#[derive(Clone, Debug, PartialEq)]
pub enum HotCommand {
    Slide(Vec3),
    Teleport(Vec3),
    Jump,
    UpdateKinematic {
        handle: EnvironmentHandle,
        matrix: [f32; 16],
    },
    ParabolicRaycast {
        origin: Vec3,
        velocity: Vec3,
    },
}

/// Worker → host updates, decoded from flat packets.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EngineUpdate {
    Position { position: Vec3, grounded: bool },
    /// `point`/`normal` are all-NaN when the arc missed.
    Raycast { point: Vec3, normal: Vec3 },
}

impl EngineUpdate {
    /// The no-hit raycast response.
    pub fn raycast_miss() -> Self {
        Self::Raycast {
            point: Vec3::from_element(f32::NAN),
            normal: Vec3::from_element(f32::NAN),
        }
    }

    /// Whether this is a raycast response signalling no hit.
    pub fn is_raycast_miss(&self) -> bool {
        matches!(self, Self::Raycast { point, .. } if point.iter().all(|v| v.is_nan()))
    }
}

/// Flatten a hot-path command into its wire packet.
pub fn encode_command(command: &HotCommand) -> Vec<f32> {
    match command {
        HotCommand::Slide(v) => vec![tag::SLIDE, v.x, v.y, v.z],
        HotCommand::Teleport(p) => vec![tag::TELEPORT, p.x, p.y, p.z],
        HotCommand::Jump => vec![tag::JUMP],
        HotCommand::UpdateKinematic { handle, matrix } => {
            let mut packet = Vec::with_capacity(18);
            packet.push(tag::UPDATE_KINEMATIC);
            packet.push(*handle as f32);
            packet.extend_from_slice(matrix);
            packet
        }
        HotCommand::ParabolicRaycast { origin, velocity } => vec![
            tag::PARABOLIC_RAYCAST,
            origin.x,
            origin.y,
            origin.z,
            velocity.x,
            velocity.y,
            velocity.z,
        ],
    }
}

/// Parse a hot-path packet back into a command.
pub fn decode_command(packet: &[f32]) -> Result<HotCommand, CodecError> {
    let (&kind, payload) = packet.split_first().ok_or(CodecError::BadLength)?;
    if kind == tag::SLIDE || kind == tag::TELEPORT {
        if payload.len() != 3 {
            return Err(CodecError::BadLength);
        }
        let v = finite_vec3(payload)?;
        return Ok(if kind == tag::SLIDE {
            HotCommand::Slide(v)
        } else {
            HotCommand::Teleport(v)
        });
    }
    if kind == tag::JUMP {
        if !payload.is_empty() {
            return Err(CodecError::BadLength);
        }
        return Ok(HotCommand::Jump);
    }
    if kind == tag::UPDATE_KINEMATIC {
        if payload.len() != 17 {
            return Err(CodecError::BadLength);
        }
        if payload.iter().any(|v| !v.is_finite()) {
            return Err(CodecError::NonFinite);
        }
        let handle = payload[0];
        if handle < 0.0 || handle.fract() != 0.0 {
            return Err(CodecError::NonFinite);
        }
        let mut matrix = [0.0; 16];
        matrix.copy_from_slice(&payload[1..]);
        return Ok(HotCommand::UpdateKinematic {
            handle: handle as EnvironmentHandle,
            matrix,
        });
    }
    if kind == tag::PARABOLIC_RAYCAST {
        if payload.len() != 6 {
            return Err(CodecError::BadLength);
        }
        return Ok(HotCommand::ParabolicRaycast {
            origin: finite_vec3(&payload[..3])?,
            velocity: finite_vec3(&payload[3..])?,
        });
    }
    Err(CodecError::UnknownKind)
}

/// Flatten an outbound update into its wire packet.
pub fn encode_update(update: &EngineUpdate) -> Vec<f32> {
    match update {
        EngineUpdate::Position { position, grounded } => vec![
            tag::POSITION_UPDATE,
            position.x,
            position.y,
            position.z,
            if *grounded { 1.0 } else { 0.0 },
        ],
        EngineUpdate::Raycast { point, normal } => vec![
            tag::RAYCAST_UPDATE,
            point.x,
            point.y,
            point.z,
            normal.x,
            normal.y,
            normal.z,
        ],
    }
}

/// Parse an outbound packet back into an update (host side).
pub fn decode_update(packet: &[f32]) -> Result<EngineUpdate, CodecError> {
    let (&kind, payload) = packet.split_first().ok_or(CodecError::BadLength)?;
    if kind == tag::POSITION_UPDATE {
        if payload.len() != 4 {
            return Err(CodecError::BadLength);
        }
        let position = finite_vec3(&payload[..3])?;
        return Ok(EngineUpdate::Position {
            position,
            grounded: payload[3] != 0.0,
        });
    }
    if kind == tag::RAYCAST_UPDATE {
        if payload.len() != 6 {
            return Err(CodecError::BadLength);
        }
        // NaN is the miss sentinel here, so no finiteness check.
        return Ok(EngineUpdate::Raycast {
            point: Vec3::new(payload[0], payload[1], payload[2]),
            normal: Vec3::new(payload[3], payload[4], payload[5]),
        });
    }
    Err(CodecError::UnknownKind)
}

fn finite_vec3(payload: &[f32]) -> Result<Vec3, CodecError> {
    if payload.iter().any(|v| !v.is_finite()) {
        return Err(CodecError::NonFinite);
    }
    Ok(Vec3::new(payload[0], payload[1], payload[2]))
}
