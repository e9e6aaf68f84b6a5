//! In-memory chat platform and helpers shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use ticketdesk::platform::{
    ChatPlatform, ComponentPress, HistoryMessage, InboundEvent, InboundMessage, OutgoingMessage,
    PlatformResult, PrivateChannelRequest,
};
use ticketdesk::waiter::CorrelationWaiter;
use ticketdesk::PlatformError;

pub const GUILD: u64 = 1;
pub const ADMIN: u64 = 10;
pub const MEMBER: u64 = 20;
pub const ROLE: u64 = 30;
pub const PANEL_CHANNEL: u64 = 100;
pub const ADMIN_CHANNEL: u64 = 101;
pub const LOG_CHANNEL: u64 = 102;

#[derive(Default)]
struct State {
    channel_names: HashMap<u64, String>,
    groups: Vec<(u64, String)>,
    private_channels: Vec<PrivateChannelRequest>,
    sent: Vec<(u64, OutgoingMessage)>,
    direct: Vec<(u64, OutgoingMessage)>,
    history: HashMap<u64, Vec<HistoryMessage>>,
    deleted_channels: HashSet<u64>,
    deleted_messages: Vec<(u64, u64)>,
    renames: Vec<(u64, String)>,
    dm_blocked: HashSet<u64>,
    undeletable: HashSet<u64>,
    clock: i64,
}

/// Records every call; ids are handed out sequentially from 1000
pub struct FakePlatform {
    state: Mutex<State>,
    next_id: AtomicU64,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(FakePlatform {
            state: Mutex::new(State::default()),
            next_id: AtomicU64::new(1000),
        })
    }

    fn id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn record(state: &mut State, channel_id: u64, author: &str, message: &OutgoingMessage) {
        state.clock += 1;
        let timestamp = Utc
            .timestamp_opt(1_700_000_000 + state.clock, 0)
            .single()
            .unwrap_or_default();
        state.history.entry(channel_id).or_default().push(HistoryMessage {
            timestamp,
            author: author.to_string(),
            content: message.content.clone().unwrap_or_default(),
            embed_titles: message.embed.iter().map(|e| e.title.clone()).collect(),
            attachment_names: message.attachment.iter().map(|a| a.filename.clone()).collect(),
        });
    }

    /// A member writes in a channel
    pub fn post(&self, channel_id: u64, author: &str, content: &str) {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, channel_id, author, &OutgoingMessage::text(content));
    }

    /// The channel disappears behind the bot's back
    pub fn remove_channel(&self, channel_id: u64) {
        let mut state = self.state.lock().unwrap();
        state.channel_names.remove(&channel_id);
        state.deleted_channels.insert(channel_id);
    }

    pub fn block_dms(&self, user_id: u64) {
        self.state.lock().unwrap().dm_blocked.insert(user_id);
    }

    pub fn refuse_deletion(&self, channel_id: u64) {
        self.state.lock().unwrap().undeletable.insert(channel_id);
    }

    pub fn name_of(&self, channel_id: u64) -> Option<String> {
        self.state.lock().unwrap().channel_names.get(&channel_id).cloned()
    }

    pub fn exists(&self, channel_id: u64) -> bool {
        self.state.lock().unwrap().channel_names.contains_key(&channel_id)
    }

    pub fn groups(&self) -> Vec<(u64, String)> {
        self.state.lock().unwrap().groups.clone()
    }

    pub fn private_channels(&self) -> Vec<PrivateChannelRequest> {
        self.state.lock().unwrap().private_channels.clone()
    }

    pub fn sent_to(&self, channel_id: u64) -> Vec<OutgoingMessage> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|(c, _)| *c == channel_id)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn direct_to(&self, user_id: u64) -> Vec<OutgoingMessage> {
        self.state
            .lock()
            .unwrap()
            .direct
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn renames(&self) -> Vec<(u64, String)> {
        self.state.lock().unwrap().renames.clone()
    }

    pub fn deleted_messages(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().deleted_messages.clone()
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn create_group(&self, _guild_id: u64, name: &str) -> PlatformResult<u64> {
        let id = self.id();
        let mut state = self.state.lock().unwrap();
        state.groups.push((id, name.to_string()));
        state.channel_names.insert(id, name.to_string());
        Ok(id)
    }

    async fn create_private_channel(&self, request: PrivateChannelRequest) -> PlatformResult<u64> {
        // A real gateway call suspends here; let racing tasks run
        tokio::task::yield_now().await;
        let id = self.id();
        let mut state = self.state.lock().unwrap();
        state.channel_names.insert(id, request.name.clone());
        state.private_channels.push(request);
        Ok(id)
    }

    async fn delete_channel(&self, channel_id: u64) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.undeletable.contains(&channel_id) {
            return Err(PlatformError::Forbidden(format!("channel {channel_id}")));
        }
        if state.channel_names.remove(&channel_id).is_none() {
            return Err(PlatformError::NotFound(format!("channel {channel_id}")));
        }
        state.deleted_channels.insert(channel_id);
        Ok(())
    }

    async fn rename_channel(&self, channel_id: u64, name: &str) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.channel_names.get_mut(&channel_id) {
            Some(current) => {
                *current = name.to_string();
                state.renames.push((channel_id, name.to_string()));
                Ok(())
            }
            None => Err(PlatformError::NotFound(format!("channel {channel_id}"))),
        }
    }

    async fn channel_name(&self, channel_id: u64) -> PlatformResult<Option<String>> {
        tokio::task::yield_now().await;
        Ok(self.state.lock().unwrap().channel_names.get(&channel_id).cloned())
    }

    async fn send_message(&self, channel_id: u64, message: OutgoingMessage) -> PlatformResult<u64> {
        let id = self.id();
        let mut state = self.state.lock().unwrap();
        if state.deleted_channels.contains(&channel_id) {
            return Err(PlatformError::NotFound(format!("channel {channel_id}")));
        }
        Self::record(&mut state, channel_id, "TicketBot", &message);
        state.sent.push((channel_id, message));
        Ok(id)
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> PlatformResult<()> {
        self.state
            .lock()
            .unwrap()
            .deleted_messages
            .push((channel_id, message_id));
        Ok(())
    }

    async fn fetch_history(&self, channel_id: u64) -> PlatformResult<Vec<HistoryMessage>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .history
            .get(&channel_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_direct_message(&self, user_id: u64, message: OutgoingMessage) -> PlatformResult<u64> {
        let id = self.id();
        let mut state = self.state.lock().unwrap();
        if state.dm_blocked.contains(&user_id) {
            return Err(PlatformError::Forbidden(format!("DM to user {user_id}")));
        }
        state.direct.push((user_id, message));
        Ok(id)
    }
}

// ============================================================================
// Events
// ============================================================================

pub fn press(user_id: u64, channel_id: u64, custom_id: &str, can_manage: bool) -> ComponentPress {
    ComponentPress {
        guild_id: Some(GUILD),
        channel_id,
        user_id,
        user_name: if user_id == ADMIN { "Admin".to_string() } else { "Alice".to_string() },
        custom_id: custom_id.to_string(),
        can_manage_channels: can_manage,
    }
}

pub fn message(user_id: u64, channel_id: u64, content: &str) -> InboundMessage {
    let channel_mentions = content
        .split("<#")
        .skip(1)
        .filter_map(|rest| rest.split('>').next()?.parse().ok())
        .collect();
    let role_mentions = content
        .split("<@&")
        .skip(1)
        .filter_map(|rest| rest.split('>').next()?.parse().ok())
        .collect();
    InboundMessage {
        guild_id: Some(GUILD),
        channel_id,
        message_id: 1,
        author_id: user_id,
        content: content.to_string(),
        role_mentions,
        channel_mentions,
    }
}

/// Hand `event` to whichever waiter accepts it, yielding until one does
pub async fn answer(waiter: &CorrelationWaiter, event: InboundEvent) {
    for _ in 0..10_000 {
        if waiter.pending_count() > 0 && waiter.offer(event.clone()).is_none() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("nobody was waiting for {event:?}");
}

pub async fn answer_press(waiter: &CorrelationWaiter, user_id: u64, channel_id: u64, custom_id: &str) {
    answer(waiter, InboundEvent::Component(press(user_id, channel_id, custom_id, true))).await
}

pub async fn answer_message(waiter: &CorrelationWaiter, user_id: u64, channel_id: u64, content: &str) {
    answer(waiter, InboundEvent::Message(message(user_id, channel_id, content))).await
}
