//! Remote store client: initial load, realtime inserts, and fire-and-forget writes

use bevy::prelude::*;
use ornament_core::realtime::reconnect_delay_secs;
use ornament_core::{ConfigError, Ornament, StoreConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::app::{ChannelStatus, UserOrnaments};

pub struct NetworkPlugin;

/// Resource storing the store connection configuration
#[derive(Resource, Clone)]
pub struct StoreSettings(pub StoreConfig);

/// Read the store URL and key baked in at build time, letting the page's
/// query string (`?store_url=...&store_key=...`) override them.
pub fn load_store_config() -> Result<StoreConfig, ConfigError> {
    let url = option_env!("ORNAMENT_STORE_URL").map(str::to_string);
    let key = option_env!("ORNAMENT_STORE_KEY").map(str::to_string);

    #[cfg(target_arch = "wasm32")]
    let (url, key) = {
        let search = web_sys::window()
            .and_then(|w| w.location().search().ok())
            .unwrap_or_default();
        let decode = |value: &str| {
            js_sys::decode_uri_component(value)
                .map(String::from)
                .unwrap_or_else(|_| value.to_string())
        };
        let url = match parse_query_param(&search, "store_url") {
            Some(value) => {
                let value = decode(value);
                tracing::info!("Using store from URL parameter: {}", value);
                Some(value)
            }
            None => url,
        };
        let key = parse_query_param(&search, "store_key").map(decode).or(key);
        (url, key)
    };

    StoreConfig::new(url.as_deref(), key.as_deref())
}

/// Find a raw (still URL-encoded) query parameter in a search string
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
fn parse_query_param<'a>(search: &'a str, param: &str) -> Option<&'a str> {
    search
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == param)
        .map(|(_, value)| value)
}

/// Results delivered by async network tasks and socket callbacks
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Initial select-all finished
    Loaded(Vec<Ornament>),
    /// Some client inserted a row
    Inserted(Ornament),
    /// Reply to the channel join
    ChannelJoined { ok: bool },
    /// Channel or socket went away
    ChannelClosed { reason: String },
}

/// Shared queue between async callbacks and Bevy
#[derive(Resource, Default, Clone)]
pub struct PendingSync(pub Arc<Mutex<Vec<SyncEvent>>>);

impl PendingSync {
    #[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
    fn push(&self, event: SyncEvent) {
        if let Ok(mut queue) = self.0.lock() {
            queue.push(event);
        }
    }
}

/// Backoff before reopening a dropped realtime socket
#[derive(Resource, Default)]
pub struct ReconnectState {
    attempts: u32,
    timer: Option<Timer>,
}

impl ReconnectState {
    /// Arm the next attempt unless one is already pending
    pub fn schedule(&mut self) {
        if self.timer.is_none() {
            self.attempts += 1;
            let delay = reconnect_delay_secs(self.attempts);
            tracing::info!("Reconnecting realtime in {}s (attempt {})", delay, self.attempts);
            self.timer = Some(Timer::from_seconds(delay, TimerMode::Once));
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.timer = None;
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_some()
    }

    /// Advance the pending timer; true on the tick the attempt is due
    #[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
    fn tick(&mut self, delta: Duration) -> bool {
        let due = self
            .timer
            .as_mut()
            .is_some_and(|timer| timer.tick(delta).just_finished());
        if due {
            self.timer = None;
        }
        due
    }
}

impl Plugin for NetworkPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PendingSync>()
            .init_resource::<ReconnectState>()
            .add_systems(Startup, (fetch_initial_ornaments, connect_realtime))
            .add_systems(Update, process_sync_events);

        #[cfg(target_arch = "wasm32")]
        app.add_systems(Update, (reconnect_realtime.after(process_sync_events), leave_channel_on_exit));
    }
}

/// Fetch every persisted ornament once at startup
fn fetch_initial_ornaments(pending: Res<PendingSync>, settings: Res<StoreSettings>) {
    #[cfg(target_arch = "wasm32")]
    {
        use wasm_bindgen_futures::spawn_local;

        let pending = PendingSync::clone(&pending);
        let config = settings.0.clone();

        spawn_local(async move {
            tracing::info!("Fetching ornaments from: {}", config.select_all_url());
            match fetch_all(&config).await {
                Ok(ornaments) => pending.push(SyncEvent::Loaded(ornaments)),
                // The user set simply stays empty for this session
                Err(e) => tracing::error!("Failed to load ornaments: {:#}", e),
            }
        });
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = (pending, settings);
        tracing::info!("Store access not available in native mode");
    }
}

#[cfg(target_arch = "wasm32")]
async fn fetch_all(config: &StoreConfig) -> anyhow::Result<Vec<Ornament>> {
    use ornament_core::store::decode_rows;
    use ornament_core::StoreError;

    let mut request = gloo_net::http::Request::get(&config.select_all_url());
    for (name, value) in config.auth_headers() {
        request = request.header(name, &value);
    }

    let response = request
        .send()
        .await
        .map_err(|e| StoreError::Request(e.to_string()))?;
    let status = response.status();
    let body = response.text().await?;
    if !response.ok() {
        return Err(StoreError::Status { status, body }.into());
    }
    Ok(decode_rows(&body)?)
}

/// Insert with the client id, dropping the id column once if the table lacks it
#[cfg(target_arch = "wasm32")]
async fn insert(config: &StoreConfig, ornament: &Ornament) -> anyhow::Result<()> {
    use ornament_core::store::{insert_body, insert_body_without_client_id, CLIENT_ID_COLUMN};

    match post_row(config, insert_body(ornament)?).await {
        Err(e) if e.is_unknown_column(CLIENT_ID_COLUMN) => {
            tracing::warn!(
                "Store table has no {} column (see sql/ornaments.sql), saving without it",
                CLIENT_ID_COLUMN
            );
            post_row(config, insert_body_without_client_id(ornament)?).await?;
            Ok(())
        }
        result => Ok(result?),
    }
}

#[cfg(target_arch = "wasm32")]
async fn post_row(config: &StoreConfig, body: String) -> Result<(), ornament_core::StoreError> {
    use ornament_core::StoreError;

    let mut request = gloo_net::http::Request::post(&config.table_url())
        .header("Content-Type", "application/json")
        .header("Prefer", "return=minimal");
    for (name, value) in config.auth_headers() {
        request = request.header(name, &value);
    }

    let response = request
        .body(body)
        .map_err(|e| StoreError::Request(e.to_string()))?
        .send()
        .await
        .map_err(|e| StoreError::Request(e.to_string()))?;
    if !response.ok() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::Status { status, body });
    }
    Ok(())
}

/// Write one ornament to the store without waiting for the result.
///
/// The caller has already shown the ornament locally; a failed write is
/// only logged, leaving it visible but unsaved.
pub fn insert_ornament(settings: &StoreSettings, ornament: &Ornament) {
    #[cfg(target_arch = "wasm32")]
    {
        use wasm_bindgen_futures::spawn_local;

        let config = settings.0.clone();
        let ornament = ornament.clone();

        spawn_local(async move {
            match insert(&config, &ornament).await {
                Ok(()) => tracing::info!("Ornament saved: {:?}", ornament.id),
                Err(e) => tracing::error!("Failed to save ornament: {:#}", e),
            }
        });
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = settings;
        tracing::info!("Store access not available in native mode, ornament {:?} kept locally", ornament.id);
    }
}

/// Apply queued network results to the user set
fn process_sync_events(
    pending: Res<PendingSync>,
    mut user: ResMut<UserOrnaments>,
    mut status: ResMut<ChannelStatus>,
    mut reconnect: ResMut<ReconnectState>,
) {
    let events = {
        if let Ok(mut queue) = pending.0.lock() {
            std::mem::take(&mut *queue)
        } else {
            Vec::new()
        }
    };

    for event in events {
        match event {
            SyncEvent::Loaded(ornaments) => {
                let total = ornaments.len();
                let added = user.0.extend(ornaments);
                tracing::info!("Loaded {} ornaments ({} new)", total, added);
            }
            SyncEvent::Inserted(ornament) => {
                if user.0.push(ornament) {
                    tracing::debug!("Ornament inserted, user set now {}", user.0.len());
                }
            }
            SyncEvent::ChannelJoined { ok } => {
                if ok {
                    tracing::info!("Subscribed to ornament inserts");
                    reconnect.reset();
                } else {
                    tracing::warn!("Realtime channel join was rejected");
                    reconnect.schedule();
                }
                status.joined = ok;
            }
            SyncEvent::ChannelClosed { reason } => {
                tracing::warn!("Realtime channel closed: {}", reason);
                status.joined = false;
                reconnect.schedule();
            }
        }
    }
}

/// Open WebSocket plus the callbacks and heartbeat interval that must outlive it.
///
/// Dropping this leaves the channel, closes the socket, and detaches every
/// callback.
#[cfg(target_arch = "wasm32")]
pub struct RealtimeSocket {
    socket: web_sys::WebSocket,
    channel: std::rc::Rc<std::cell::RefCell<ornament_core::InsertChannel>>,
    closed: std::rc::Rc<std::cell::Cell<bool>>,
    heartbeat_interval: Option<i32>,
    _onopen: wasm_bindgen::closure::Closure<dyn FnMut(wasm_bindgen::JsValue)>,
    _onmessage: wasm_bindgen::closure::Closure<dyn FnMut(web_sys::MessageEvent)>,
    _onclose: wasm_bindgen::closure::Closure<dyn FnMut(web_sys::CloseEvent)>,
    _onheartbeat: wasm_bindgen::closure::Closure<dyn FnMut()>,
    onpagehide: wasm_bindgen::closure::Closure<dyn FnMut(web_sys::Event)>,
}

#[cfg(target_arch = "wasm32")]
impl RealtimeSocket {
    /// Open the socket and join `channel` once it connects.
    ///
    /// Heartbeats run on a browser interval rather than the frame loop, so a
    /// hidden tab keeps its connection.
    fn open(config: &StoreConfig, pending: &PendingSync, channel: ornament_core::InsertChannel) -> Option<Self> {
        use ornament_core::realtime::HEARTBEAT_INTERVAL_SECS;
        use ornament_core::ChannelEvent;
        use std::cell::{Cell, RefCell};
        use std::rc::Rc;
        use wasm_bindgen::prelude::*;
        use web_sys::{CloseEvent, MessageEvent, WebSocket};

        let url = config.realtime_url();
        tracing::info!("Connecting to realtime: {}", url.split('?').next().unwrap_or(&url));

        let socket = match WebSocket::new(&url) {
            Ok(socket) => socket,
            Err(e) => {
                tracing::error!("Failed to create WebSocket: {:?}", e);
                return None;
            }
        };

        let channel = Rc::new(RefCell::new(channel));
        let closed = Rc::new(Cell::new(false));

        let onopen = {
            let socket = socket.clone();
            let channel = channel.clone();
            Closure::wrap(Box::new(move |_| {
                tracing::info!("WebSocket connected");
                match channel.borrow_mut().join() {
                    Ok(frame) => {
                        if let Err(e) = socket.send_with_str(&frame) {
                            tracing::error!("Failed to join channel: {:?}", e);
                        }
                    }
                    Err(e) => tracing::error!("{}", e),
                }
            }) as Box<dyn FnMut(JsValue)>)
        };
        socket.set_onopen(Some(onopen.as_ref().unchecked_ref()));

        let onmessage = {
            let channel = channel.clone();
            let pending = pending.clone();
            Closure::wrap(Box::new(move |e: MessageEvent| {
                let Ok(text) = e.data().dyn_into::<js_sys::JsString>() else {
                    return;
                };
                let text: String = text.into();
                match channel.borrow().parse(&text) {
                    Ok(ChannelEvent::Inserted(ornament)) => pending.push(SyncEvent::Inserted(ornament)),
                    Ok(ChannelEvent::Joined { ok }) => pending.push(SyncEvent::ChannelJoined { ok }),
                    Ok(ChannelEvent::Closed { reason }) => pending.push(SyncEvent::ChannelClosed { reason }),
                    Ok(ChannelEvent::Ignored) => {}
                    Err(e) => tracing::debug!("Ignoring realtime frame: {}", e),
                }
            }) as Box<dyn FnMut(MessageEvent)>)
        };
        socket.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));

        // Only closes we did not ask for are reported
        let onclose = {
            let pending = pending.clone();
            let closed = closed.clone();
            Closure::wrap(Box::new(move |e: CloseEvent| {
                if closed.replace(true) {
                    return;
                }
                pending.push(SyncEvent::ChannelClosed {
                    reason: format!("socket closed ({})", e.code()),
                });
            }) as Box<dyn FnMut(CloseEvent)>)
        };
        socket.set_onclose(Some(onclose.as_ref().unchecked_ref()));

        let onheartbeat = {
            let socket = socket.clone();
            let channel = channel.clone();
            let closed = closed.clone();
            Closure::wrap(Box::new(move || {
                send_heartbeat(&socket, &channel, &closed);
            }) as Box<dyn FnMut()>)
        };

        // Leave the channel when the page goes away
        let onpagehide = {
            let socket = socket.clone();
            let channel = channel.clone();
            let closed = closed.clone();
            Closure::wrap(Box::new(move |_: web_sys::Event| {
                leave_and_close(&socket, &channel, &closed);
            }) as Box<dyn FnMut(web_sys::Event)>)
        };

        let mut heartbeat_interval = None;
        if let Some(window) = web_sys::window() {
            match window.set_interval_with_callback_and_timeout_and_arguments_0(
                onheartbeat.as_ref().unchecked_ref(),
                (HEARTBEAT_INTERVAL_SECS * 1000.0) as i32,
            ) {
                Ok(id) => heartbeat_interval = Some(id),
                Err(e) => tracing::warn!("Failed to start heartbeat: {:?}", e),
            }
            let _ = window.add_event_listener_with_callback("pagehide", onpagehide.as_ref().unchecked_ref());
        }

        Some(Self {
            socket,
            channel,
            closed,
            heartbeat_interval,
            _onopen: onopen,
            _onmessage: onmessage,
            _onclose: onclose,
            _onheartbeat: onheartbeat,
            onpagehide,
        })
    }

    /// Channel state to carry over to a replacement socket
    fn channel(&self) -> ornament_core::InsertChannel {
        self.channel.borrow().clone()
    }

    fn close(&self) {
        leave_and_close(&self.socket, &self.channel, &self.closed);
    }
}

#[cfg(target_arch = "wasm32")]
impl Drop for RealtimeSocket {
    fn drop(&mut self) {
        use wasm_bindgen::JsCast;

        self.close();

        // The closures are freed with us; JS must not call them afterwards
        self.socket.set_onopen(None);
        self.socket.set_onmessage(None);
        self.socket.set_onclose(None);
        if let Some(window) = web_sys::window() {
            if let Some(id) = self.heartbeat_interval.take() {
                window.clear_interval_with_handle(id);
            }
            let _ = window.remove_event_listener_with_callback("pagehide", self.onpagehide.as_ref().unchecked_ref());
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn send_heartbeat(
    socket: &web_sys::WebSocket,
    channel: &std::cell::RefCell<ornament_core::InsertChannel>,
    closed: &std::cell::Cell<bool>,
) {
    if closed.get() || socket.ready_state() != web_sys::WebSocket::OPEN {
        return;
    }
    match channel.borrow_mut().heartbeat() {
        Ok(frame) => {
            if let Err(e) = socket.send_with_str(&frame) {
                tracing::warn!("Failed to send heartbeat: {:?}", e);
            }
        }
        Err(e) => tracing::warn!("{}", e),
    }
}

#[cfg(target_arch = "wasm32")]
fn leave_and_close(
    socket: &web_sys::WebSocket,
    channel: &std::cell::RefCell<ornament_core::InsertChannel>,
    closed: &std::cell::Cell<bool>,
) {
    if closed.replace(true) {
        return;
    }
    if socket.ready_state() == web_sys::WebSocket::OPEN {
        if let Ok(frame) = channel.borrow_mut().leave() {
            let _ = socket.send_with_str(&frame);
        }
    }
    if let Err(e) = socket.close() {
        tracing::warn!("Failed to close realtime socket: {:?}", e);
    }
    tracing::info!("Realtime channel closed");
}

/// Open the realtime socket and join the insert channel
fn connect_realtime(world: &mut World) {
    #[cfg(target_arch = "wasm32")]
    open_realtime(world, ornament_core::InsertChannel::default());

    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = world;
        tracing::info!("Realtime channel not available in native mode");
    }
}

#[cfg(target_arch = "wasm32")]
fn open_realtime(world: &mut World, channel: ornament_core::InsertChannel) {
    let config = world.resource::<StoreSettings>().0.clone();
    let pending = world.resource::<PendingSync>().clone();

    if let Some(socket) = RealtimeSocket::open(&config, &pending, channel) {
        world.insert_non_send_resource(socket);
    }
}

/// Replace a dropped socket once the backoff elapses
#[cfg(target_arch = "wasm32")]
fn reconnect_realtime(world: &mut World) {
    let delta = world.resource::<Time>().delta();
    if !world.resource_mut::<ReconnectState>().tick(delta) {
        return;
    }

    // Dropping the old socket detaches its callbacks; the channel keeps
    // counting refs so the next join gets a fresh one
    let channel = world
        .remove_non_send_resource::<RealtimeSocket>()
        .map(|old| old.channel())
        .unwrap_or_default();
    open_realtime(world, channel);
}

#[cfg(target_arch = "wasm32")]
fn leave_channel_on_exit(mut exits: MessageReader<AppExit>, socket: Option<NonSend<RealtimeSocket>>) {
    if exits.read().next().is_some() {
        if let Some(socket) = socket {
            socket.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{sync_user_markers, MarkerAssets, OrnamentMarker};
    use ornament_core::store::decode_row;
    use ornament_core::OrnamentId;

    #[test]
    fn test_parse_query_param() {
        let search = "?store_url=https%3A%2F%2Ftree.example.co&store_key=abc&flag";
        assert_eq!(parse_query_param(search, "store_url"), Some("https%3A%2F%2Ftree.example.co"));
        assert_eq!(parse_query_param(search, "store_key"), Some("abc"));
        assert_eq!(parse_query_param(search, "flag"), None);
        assert_eq!(parse_query_param("", "store_key"), None);
    }

    fn sync_app() -> App {
        let mut app = App::new();
        app.init_resource::<PendingSync>()
            .init_resource::<UserOrnaments>()
            .init_resource::<ChannelStatus>()
            .init_resource::<ReconnectState>()
            .insert_resource(MarkerAssets {
                sphere: Handle::default(),
                decorative: Handle::default(),
                user: Handle::default(),
            })
            .add_systems(Update, (process_sync_events, sync_user_markers).chain());
        app
    }

    fn marker_count(app: &mut App) -> usize {
        let world = app.world_mut();
        let mut markers = world.query::<&OrnamentMarker>();
        markers.iter(world).count()
    }

    #[test]
    fn test_sync_events_reach_user_set_and_markers() {
        let mut app = sync_app();
        let pending = app.world().resource::<PendingSync>().clone();

        let id = OrnamentId::parse("4f2d3c8e-1b1a-4c55-9d0e-2a6b7c8d9e0f").unwrap();
        let saved = Ornament::new(Vec3::new(1.0, 2.0, 3.0), "🇫🇷", "Hi").with_id(id);
        pending.push(SyncEvent::Loaded(vec![
            saved.clone(),
            Ornament::new(Vec3::ZERO, "🇯🇵", "legacy row"),
        ]));
        // Echo of a known row, then a row with missing fields
        pending.push(SyncEvent::Inserted(saved));
        pending.push(SyncEvent::Inserted(decode_row(&serde_json::json!({ "x": 0.5, "y": null }))));
        app.update();

        let user = &app.world().resource::<UserOrnaments>().0;
        assert_eq!(user.len(), 3);
        let partial = user.get(2).unwrap();
        assert_eq!(partial.position, Vec3::new(0.5, 0.0, 0.0));
        assert_eq!(partial.country, "");
        assert_eq!(partial.message, "");
        assert_eq!(marker_count(&mut app), 3);

        // Later arrivals only spawn their own markers
        pending.push(SyncEvent::Inserted(Ornament::new(Vec3::ONE, "🇰🇷", "late")));
        app.update();
        assert_eq!(app.world().resource::<UserOrnaments>().0.len(), 4);
        assert_eq!(marker_count(&mut app), 4);
    }

    #[test]
    fn test_channel_close_schedules_reconnect() {
        let mut app = sync_app();
        let pending = app.world().resource::<PendingSync>().clone();

        pending.push(SyncEvent::ChannelJoined { ok: true });
        app.update();
        assert!(app.world().resource::<ChannelStatus>().joined);
        assert!(!app.world().resource::<ReconnectState>().is_pending());

        pending.push(SyncEvent::ChannelClosed { reason: "socket closed (1006)".to_string() });
        app.update();
        assert!(!app.world().resource::<ChannelStatus>().joined);
        assert!(app.world().resource::<ReconnectState>().is_pending());

        // Rejoining clears the backoff
        pending.push(SyncEvent::ChannelJoined { ok: true });
        app.update();
        assert!(app.world().resource::<ChannelStatus>().joined);
        assert!(!app.world().resource::<ReconnectState>().is_pending());
    }

    #[test]
    fn test_reconnect_timer_fires_once() {
        let mut state = ReconnectState::default();
        assert!(!state.tick(Duration::from_secs(5)));

        state.schedule();
        state.schedule();
        assert_eq!(state.attempts, 1);
        assert!(!state.tick(Duration::from_millis(500)));
        assert!(state.tick(Duration::from_millis(600)));
        assert!(!state.is_pending());
        assert!(!state.tick(Duration::from_secs(5)));

        state.schedule();
        assert_eq!(state.attempts, 2);
    }
}
