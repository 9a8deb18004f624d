use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use crate::config::{AudioAttributes, Usage};
use crate::error::PlayerError;

/// Volume applied while ducked
pub const DUCK_VOLUME: f32 = 0.3;

/// Volume applied when full focus is held
pub const FULL_VOLUME: f32 = 1.0;

/// Notification delivered by the focus service to a holder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusChange {
    Gain,
    Loss,
    LossTransient,
    LossTransientCanDuck,
}

impl fmt::Display for FocusChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FocusChange::Gain => "AUDIOFOCUS_GAIN",
            FocusChange::Loss => "AUDIOFOCUS_LOSS",
            FocusChange::LossTransient => "AUDIOFOCUS_LOSS_TRANSIENT",
            FocusChange::LossTransientCanDuck => "AUDIOFOCUS_LOSS_TRANSIENT_CAN_DUCK",
        };
        f.write_str(name)
    }
}

/// Callback invoked by the service on an arbitrary thread
pub type FocusCallback = Arc<dyn Fn(FocusChange) + Send + Sync>;

/// Opaque token for granted focus. Deliberately not `Clone`: there is
/// exactly one owner, and giving it back consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct FocusGrant {
    id: u64,
}

impl FocusGrant {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Shared-device arbitration service
pub trait FocusService: Send + Sync {
    /// Ask for focus. Fails with `PlayerError::Device` when refused.
    fn request(
        &self,
        attributes: AudioAttributes,
        on_change: FocusCallback,
    ) -> Result<FocusGrant, PlayerError>;

    /// Give focus back. Unknown or already-abandoned grants are ignored.
    fn abandon(&self, grant: FocusGrant);
}

/// What to do with the session when focus changes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FocusAction {
    /// Back to full volume, resuming the sink if it was paused
    Restore,
    /// Lower the volume and keep playing
    Duck(f32),
    /// Pause the sink, keeping file and device open
    Pause,
    /// Tear the session down
    Stop,
}

/// How to react to a transient loss without ducking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransientLossPolicy {
    #[default]
    Pause,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusState {
    NoFocus,
    Granted,
}

/// Holds at most one grant for a session and maps notifications to actions
pub struct FocusArbiter {
    service: Arc<dyn FocusService>,
    grant: Option<FocusGrant>,
}

impl FocusArbiter {
    pub fn new(service: Arc<dyn FocusService>) -> Self {
        Self {
            service,
            grant: None,
        }
    }

    pub fn state(&self) -> FocusState {
        if self.grant.is_some() {
            FocusState::Granted
        } else {
            FocusState::NoFocus
        }
    }

    pub fn request_focus(
        &mut self,
        attributes: AudioAttributes,
        on_change: FocusCallback,
    ) -> Result<(), PlayerError> {
        if self.grant.is_some() {
            debug!("Focus already granted, not requesting again");
            return Ok(());
        }

        let grant = self.service.request(attributes, on_change)?;
        info!("Audio focus granted (usage {})", attributes.usage);
        self.grant = Some(grant);
        Ok(())
    }

    /// Release the grant if one is held
    pub fn abandon(&mut self) {
        if let Some(grant) = self.grant.take() {
            debug!("Abandoning audio focus grant {}", grant.id());
            self.service.abandon(grant);
        }
    }

    pub fn action_for(change: FocusChange, policy: TransientLossPolicy) -> FocusAction {
        match change {
            FocusChange::Gain => FocusAction::Restore,
            FocusChange::Loss => FocusAction::Stop,
            FocusChange::LossTransient => match policy {
                TransientLossPolicy::Pause => FocusAction::Pause,
                TransientLossPolicy::Stop => FocusAction::Stop,
            },
            FocusChange::LossTransientCanDuck => FocusAction::Duck(DUCK_VOLUME),
        }
    }
}

impl Drop for FocusArbiter {
    fn drop(&mut self) {
        self.abandon();
    }
}

/// How a new holder with `usage` affects the one below it
fn displacement_for(usage: Usage) -> FocusChange {
    match usage {
        Usage::Alarm
        | Usage::NotificationRingtone
        | Usage::VoiceCommunication
        | Usage::VoiceCommunicationSignalling
        | Usage::Emergency
        | Usage::Safety => FocusChange::LossTransient,
        Usage::Notification
        | Usage::NotificationEvent
        | Usage::AssistanceAccessibility
        | Usage::AssistanceNavigationGuidance
        | Usage::AssistanceSonification
        | Usage::Assistant
        | Usage::Announcement
        | Usage::VehicleStatus
        | Usage::SpeakerCleanup => FocusChange::LossTransientCanDuck,
        Usage::Unknown | Usage::Media | Usage::Game => FocusChange::Loss,
    }
}

struct Holder {
    id: u64,
    usage: Usage,
    on_change: FocusCallback,
    displaced: bool,
}

/// In-process focus arbitration: a stack of holders, newest on top
#[derive(Default)]
pub struct LocalFocusService {
    holders: Mutex<Vec<Holder>>,
    next_id: AtomicU64,
}

impl LocalFocusService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holder_count(&self) -> usize {
        self.holders.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl FocusService for LocalFocusService {
    fn request(
        &self,
        attributes: AudioAttributes,
        on_change: FocusCallback,
    ) -> Result<FocusGrant, PlayerError> {
        let notify;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let mut holders = self.holders.lock().unwrap_or_else(|e| e.into_inner());

            if let Some(top) = holders.last() {
                if top.usage == Usage::VoiceCommunication {
                    warn!("Focus request denied: voice communication in progress");
                    return Err(PlayerError::Device(
                        "audio focus denied: a voice call holds the output".to_string(),
                    ));
                }
            }

            let change = displacement_for(attributes.usage);
            notify = match holders.last_mut() {
                Some(top) => {
                    let callback = Arc::clone(&top.on_change);
                    if change == FocusChange::Loss {
                        holders.pop();
                    } else {
                        top.displaced = true;
                    }
                    Some((callback, change))
                }
                None => None,
            };

            holders.push(Holder {
                id,
                usage: attributes.usage,
                on_change,
                displaced: false,
            });
        }

        if let Some((callback, change)) = notify {
            debug!("Notifying previous focus holder: {}", change);
            callback(change);
        }

        Ok(FocusGrant::new(id))
    }

    fn abandon(&self, grant: FocusGrant) {
        let notify;
        {
            let mut holders = self.holders.lock().unwrap_or_else(|e| e.into_inner());
            let Some(index) = holders.iter().position(|h| h.id == grant.id()) else {
                debug!("Ignoring abandon of unknown grant {}", grant.id());
                return;
            };

            let was_top = index + 1 == holders.len();
            holders.remove(index);

            notify = match holders.last_mut() {
                Some(top) if was_top && top.displaced => {
                    top.displaced = false;
                    Some(Arc::clone(&top.on_change))
                }
                _ => None,
            };
        }

        if let Some(callback) = notify {
            debug!("Returning focus to displaced holder");
            callback(FocusChange::Gain);
        }
    }
}
