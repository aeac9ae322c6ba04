/*!
Host-facing engine handle.

[`Engine::spawn`] starts one named worker thread running the cooperative loop
and hands back the only two edges between host and worker: a sender for
commands and a receiver for flat update packets. Dropping the handle closes the
command channel, which terminates the loop and joins the thread.
*/

use std::{
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread::JoinHandle,
    time::Duration,
};

use engine::{Config, ConfigUpdate, EnvironmentHandle, EnvironmentKind, LocomotionCore, Vec3};

use crate::{
    messages::{
        EngineUpdate, HostMessage, HotCommand, StructuredMessage, decode_update, encode_command,
    },
    scheduler::Worker,
};

/// A running locomotion engine instance.
///
/// Handles are independent: spawn as many engines as needed (one per player,
/// one per test); there is no process-wide state.
pub struct Engine {
    sender: Option<Sender<HostMessage>>,
    updates: Receiver<Vec<f32>>,
    worker: Option<JoinHandle<()>>,
}

impl Engine {
    /// Spawn a worker thread ticking at `config.update_frequency`.
    pub fn spawn(config: Config) -> Self {
        let (sender, inbox) = mpsc::channel();
        let (outbox, updates) = mpsc::channel();
        let worker = std::thread::Builder::new()
            .name("locomotion-worker".into())
            .spawn(move || Worker::new(LocomotionCore::new(config), inbox, outbox).run())
            .expect("spawning the locomotion worker thread succeeds");
        Self {
            sender: Some(sender),
            updates,
            worker: Some(worker),
        }
    }

    /// Send any message to the worker. The convenience methods below cover
    /// the common kinds.
    pub fn send(&self, message: HostMessage) {
        if let Some(sender) = &self.sender
            && sender.send(message).is_err()
        {
            log::warn!("locomotion worker is gone; dropping message");
        }
    }

    /// Place the player and start integration.
    pub fn init(&self, position: Vec3) {
        self.send(HostMessage::Structured(StructuredMessage::Init {
            position: [position.x, position.y, position.z],
        }));
    }

    /// Overlay configuration knobs.
    pub fn configure(&self, update: ConfigUpdate) {
        self.send(HostMessage::Structured(StructuredMessage::Config(update)));
    }

    /// Register an environment from flattened geometry and a column-major
    /// world matrix. The buffers are copied before this returns.
    pub fn add_environment(
        &self,
        handle: EnvironmentHandle,
        positions: &[f32],
        indices: Option<&[u32]>,
        kind: EnvironmentKind,
        matrix: [f32; 16],
    ) {
        self.send(HostMessage::Structured(StructuredMessage::AddEnvironment {
            handle,
            positions: positions.to_vec(),
            indices: indices.map(<[u32]>::to_vec),
            kind,
            matrix,
        }));
    }

    /// Drop an environment; unknown handles are ignored.
    pub fn remove_environment(&self, handle: EnvironmentHandle) {
        self.send(HostMessage::Structured(StructuredMessage::RemoveEnvironment {
            handle,
        }));
    }

    /// Re-pose a kinematic environment (once per host frame when it moved).
    pub fn update_kinematic(&self, handle: EnvironmentHandle, matrix: [f32; 16]) {
        self.send(HostMessage::Hot(encode_command(
            &HotCommand::UpdateKinematic { handle, matrix },
        )));
    }

    /// Request a planar slide velocity.
    pub fn slide(&self, velocity: Vec3) {
        self.send(HostMessage::Hot(encode_command(&HotCommand::Slide(velocity))));
    }

    /// Request an instant move.
    pub fn teleport(&self, target: Vec3) {
        self.send(HostMessage::Hot(encode_command(&HotCommand::Teleport(target))));
    }

    /// Request a jump.
    pub fn jump(&self) {
        self.send(HostMessage::Hot(encode_command(&HotCommand::Jump)));
    }

    /// Cast a teleport aiming arc; the answer arrives as one
    /// [`EngineUpdate::Raycast`] on the update stream.
    pub fn parabolic_raycast(&self, origin: Vec3, velocity: Vec3) {
        self.send(HostMessage::Hot(encode_command(
            &HotCommand::ParabolicRaycast { origin, velocity },
        )));
    }

    /// Non-blocking poll for the next update.
    pub fn try_recv_update(&self) -> Option<EngineUpdate> {
        loop {
            let packet = self.updates.try_recv().ok()?;
            match decode_update(&packet) {
                Ok(update) => return Some(update),
                Err(err) => log::debug!("dropping malformed update packet: {err}"),
            }
        }
    }

    /// Blocking wait for the next update, up to `timeout`.
    pub fn recv_update_timeout(&self, timeout: Duration) -> Option<EngineUpdate> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            match self.updates.recv_timeout(remaining) {
                Ok(packet) => match decode_update(&packet) {
                    Ok(update) => return Some(update),
                    Err(err) => log::debug!("dropping malformed update packet: {err}"),
                },
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None;
                }
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Disconnect the command channel so the loop exits, then join.
        self.sender.take();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            log::warn!("locomotion worker panicked during shutdown");
        }
    }
}
