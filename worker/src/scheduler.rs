/*!
The cooperative worker loop.

One loop per engine instance: wake on the earlier of the next tick deadline or
an incoming message, drain messages in arrival order between ticks, and never
yield mid-integration. Raycast requests are answered synchronously on arrival;
everything else lands in the core's command slots or the registry and takes
effect before the next integration step.

If a tick overruns its interval, the next tick is scheduled immediately; the
deficit never grows beyond one tick.
*/

use std::{
    sync::mpsc::{Receiver, RecvTimeoutError, Sender},
    time::{Duration, Instant},
};

use engine::{LocomotionCore, Vec3};

use crate::messages::{
    EngineUpdate, HostMessage, HotCommand, StructuredMessage, decode_command, encode_update,
};

pub(crate) struct Worker {
    core: LocomotionCore,
    inbox: Receiver<HostMessage>,
    outbox: Sender<Vec<f32>>,
}

impl Worker {
    pub(crate) fn new(
        core: LocomotionCore,
        inbox: Receiver<HostMessage>,
        outbox: Sender<Vec<f32>>,
    ) -> Self {
        Self {
            core,
            inbox,
            outbox,
        }
    }

    /// Run until the host drops its sender.
    pub(crate) fn run(mut self) {
        let mut next_tick = Instant::now() + self.tick_interval();
        loop {
            let now = Instant::now();
            if now >= next_tick {
                self.tick();
                next_tick += self.tick_interval();
                if next_tick < now {
                    // Overrun: schedule the next tick immediately, but do not
                    // accumulate further deficit.
                    next_tick = now;
                }
                continue;
            }
            match self.inbox.recv_timeout(next_tick - now) {
                Ok(message) => self.handle(message),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    #[inline]
    fn tick_interval(&self) -> Duration {
        Duration::from_secs_f32(self.core.config.dt())
    }

    fn tick(&mut self) {
        if let Some(update) = self.core.step() {
            self.emit(EngineUpdate::Position {
                position: update.position,
                grounded: update.grounded,
            });
        }
    }

    fn handle(&mut self, message: HostMessage) {
        match message {
            HostMessage::Structured(message) => self.handle_structured(message),
            HostMessage::Hot(packet) => self.handle_hot(&packet),
        }
    }

    fn handle_structured(&mut self, message: StructuredMessage) {
        match message {
            StructuredMessage::Init { position } => {
                self.core
                    .init(Vec3::new(position[0], position[1], position[2]));
            }
            StructuredMessage::Config(update) => update.apply(&mut self.core.config),
            StructuredMessage::AddEnvironment {
                handle,
                positions,
                indices,
                kind,
                matrix,
            } => {
                if !self.core.is_initialized() {
                    log::debug!("ignoring AddEnvironment({handle}) before Init");
                    return;
                }
                if let Err(err) =
                    self.core
                        .registry
                        .add(handle, &positions, indices.as_deref(), kind, &matrix)
                {
                    log::warn!("rejected AddEnvironment({handle}): {err}");
                }
            }
            StructuredMessage::RemoveEnvironment { handle } => {
                if !self.core.is_initialized() {
                    log::debug!("ignoring RemoveEnvironment({handle}) before Init");
                    return;
                }
                // Absent handles are a silent no-op.
                self.core.registry.remove(handle);
            }
        }
    }

    fn handle_hot(&mut self, packet: &[f32]) {
        let command = match decode_command(packet) {
            Ok(command) => command,
            Err(err) => {
                log::debug!("dropping malformed packet: {err}");
                return;
            }
        };
        if !self.core.is_initialized() {
            log::debug!("ignoring hot-path command before Init");
            return;
        }
        match command {
            HotCommand::Slide(velocity) => self.core.slide(velocity),
            HotCommand::Teleport(target) => self.core.teleport(target),
            HotCommand::Jump => self.core.jump(),
            HotCommand::UpdateKinematic { handle, matrix } => {
                if let Err(err) = self.core.registry.update_transform(handle, &matrix) {
                    log::debug!("ignoring UpdateKinematicEnvironment({handle}): {err}");
                }
            }
            HotCommand::ParabolicRaycast { origin, velocity } => {
                // Answered synchronously; exactly one response per request.
                let update = match self.core.parabolic_raycast(origin, velocity) {
                    Some(hit) => EngineUpdate::Raycast {
                        point: hit.point,
                        normal: hit.normal,
                    },
                    None => EngineUpdate::raycast_miss(),
                };
                self.emit(update);
            }
        }
    }

    fn emit(&self, update: EngineUpdate) {
        // A disconnected host is about to tear the worker down anyway.
        let _ = self.outbox.send(encode_update(&update));
    }
}
