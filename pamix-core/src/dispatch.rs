//! Turns abstract actions into selection changes and session calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use pamix_types::{from_fraction, Action, Entity, EntityKey, EntityKind};

use crate::scheduler::UpdateScheduler;
use crate::session::Session;
use crate::store::EntityStore;
use crate::transport::lock;

/// What navigation needs to know about one listed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryShape {
    pub channels: usize,
    pub locked: bool,
}

impl EntryShape {
    pub fn of(entity: &Entity) -> Self {
        Self {
            channels: entity.channels(),
            locked: entity.volume_locked,
        }
    }
}

/// Shapes of the entities of `kind`, in display order.
pub fn entry_shapes(store: &EntityStore, kind: EntityKind) -> Vec<EntryShape> {
    store.display_order(kind).into_iter().map(EntryShape::of).collect()
}

/// Cursor over the active tab. `entry` indexes the display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub kind: EntityKind,
    pub entry: usize,
    pub channel: usize,
}

impl Default for Selection {
    fn default() -> Self {
        Self::new(EntityKind::SinkInput)
    }
}

impl Selection {
    pub fn new(kind: EntityKind) -> Self {
        Self { kind, entry: 0, channel: 0 }
    }

    pub fn select_tab(&mut self, kind: EntityKind) {
        *self = Self::new(kind);
    }

    /// Pull the cursor back inside the list after it shrank.
    pub fn clamp(&mut self, entries: &[EntryShape]) {
        if entries.is_empty() {
            self.entry = 0;
            self.channel = 0;
            return;
        }
        if self.entry >= entries.len() {
            self.entry = entries.len() - 1;
            self.channel = 0;
        }
        let current = entries[self.entry];
        if current.locked || self.channel >= current.channels {
            self.channel = 0;
        }
    }

    pub fn select_next(&mut self, entries: &[EntryShape], include_channel: bool) {
        self.clamp(entries);
        let Some(current) = entries.get(self.entry) else { return };
        if include_channel && !current.locked && self.channel + 1 < current.channels {
            self.channel += 1;
        } else if self.entry + 1 < entries.len() {
            self.entry += 1;
            self.channel = 0;
        }
    }

    pub fn select_prev(&mut self, entries: &[EntryShape], include_channel: bool) {
        self.clamp(entries);
        let Some(current) = entries.get(self.entry) else { return };
        if include_channel && !current.locked && self.channel > 0 {
            self.channel -= 1;
        } else if self.entry > 0 {
            self.entry -= 1;
            let entered = entries[self.entry];
            self.channel = if include_channel && !entered.locked {
                entered.channels.saturating_sub(1)
            } else {
                0
            };
        }
    }

    /// The channel a volume change applies to; `None` means all of them.
    pub fn volume_channel(&self, shape: EntryShape) -> Option<usize> {
        (!shape.locked).then_some(self.channel)
    }
}

/// Serializes user actions against the session.
///
/// The selection lock is taken before the store and never held across a
/// session call, so a slow server does not stall the draw thread.
pub struct Dispatcher {
    session: Arc<Session>,
    scheduler: Arc<UpdateScheduler>,
    selection: Mutex<Selection>,
    running: AtomicBool,
}

impl Dispatcher {
    pub fn new(session: Arc<Session>, scheduler: Arc<UpdateScheduler>) -> Self {
        Self {
            session,
            scheduler,
            selection: Mutex::new(Selection::default()),
            running: AtomicBool::new(true),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn selection(&self) -> Selection {
        *lock(&self.selection)
    }

    /// Run `f` on a consistent view: the selection clamped to the store it
    /// is shown against, both locked for the duration.
    pub fn with_view<R>(&self, f: impl FnOnce(&Selection, &EntityStore) -> R) -> R {
        let mut selection = lock(&self.selection);
        let store = lock(self.session.store());
        let kind = selection.kind;
        selection.clamp(&entry_shapes(&store, kind));
        f(&selection, &store)
    }

    pub fn dispatch(&self, action: &Action) {
        log::debug!(target: "dispatch", "{:?}", action);
        match action {
            Action::Quit => {
                self.running.store(false, Ordering::SeqCst);
                self.scheduler.post_meters();
                return;
            }
            Action::SelectTab(kind) => lock(&self.selection).select_tab(*kind),
            Action::CycleTab { forward } => {
                let mut selection = lock(&self.selection);
                let kind = if *forward {
                    selection.kind.next_tab()
                } else {
                    selection.kind.prev_tab()
                };
                selection.select_tab(kind);
            }
            Action::SelectNext { channel } => {
                let mut selection = lock(&self.selection);
                let shapes = entry_shapes(&lock(self.session.store()), selection.kind);
                selection.select_next(&shapes, *channel);
            }
            Action::SelectPrev { channel } => {
                let mut selection = lock(&self.selection);
                let shapes = entry_shapes(&lock(self.session.store()), selection.kind);
                selection.select_prev(&shapes, *channel);
            }
            _ => self.apply_to_target(action),
        }
        self.scheduler.post_full();
    }

    /// Entity actions. The selection lock is released before the session
    /// blocks on the server.
    fn apply_to_target(&self, action: &Action) {
        let Some(target) = self.target() else { return };
        let key = target.key;
        match action {
            Action::SetVolume(fraction) if target.shape.channels > 0 => {
                self.session.set_volume(key, target.channel, from_fraction(*fraction));
            }
            Action::AddVolume(pct) if target.shape.channels > 0 => {
                self.session.add_volume(key, target.channel, *pct);
            }
            Action::Cycle { forward } => {
                self.session.cycle(key, *forward);
            }
            Action::ToggleMute => {
                self.session.toggle_mute(key);
            }
            Action::SetMute(muted) => {
                self.session.set_mute(key, *muted);
            }
            Action::ToggleLock => {
                self.session.toggle_lock(key);
                lock(&self.selection).channel = 0;
            }
            Action::SetLock(locked) => {
                self.session.set_lock(key, *locked);
                lock(&self.selection).channel = 0;
            }
            Action::Kill => {
                self.session.kill(key);
            }
            _ => {}
        }
    }

    /// The selected entity, after clamping the selection to the store.
    fn target(&self) -> Option<Target> {
        let mut selection = lock(&self.selection);
        let store = lock(self.session.store());
        let view = store.display_order(selection.kind);
        let shapes: Vec<EntryShape> = view.iter().map(|e| EntryShape::of(e)).collect();
        selection.clamp(&shapes);
        let target = view.get(selection.entry).map(|e| {
            let shape = EntryShape::of(e);
            Target { key: e.key(), shape, channel: selection.volume_channel(shape) }
        });
        target
    }
}

/// What an entity action applies to, copied out of the selection.
#[derive(Debug, Clone, Copy)]
struct Target {
    key: EntityKey,
    shape: EntryShape,
    channel: Option<usize>,
}
