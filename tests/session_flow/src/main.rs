fn main() {
    println!("Run `cargo test -p session-flow` to execute the end-to-end session tests.");
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tokio::sync::mpsc;

    use hublink_cache::{CacheError, KvStore, SnapshotCache};
    use hublink_client::{HubClient, NoticeQueue};
    use hublink_discovery::listener::AnnouncementListener;
    use hublink_discovery::{
        DiscoveryConfig, DiscoveryCoordinator, DiscoveryError, HubAnnouncement,
    };
    use hublink_protocol::envelope::Message;
    use hublink_protocol::{CachedSnapshot, Hub, MessageType};
    use hublink_queue::{CommandQueue, CommandStatus, QueueConfig};
    use hublink_session::{
        ConnectionManager, ConnectionState, HubSession, SessionConfig, SessionError,
        SessionTransport,
    };

    // -- scripted listener ---------------------------------------------------

    fn announcement(id: &str) -> HubAnnouncement {
        HubAnnouncement {
            id: id.into(),
            address: format!("10.0.0.{}:8088", id.len()),
            display_name: format!("Hub {id}"),
            firmware_version: Some("4.15.250".into()),
            remote_id: None,
        }
    }

    /// Plays back a fixed announcement script on a virtual clock.
    struct ScriptedListener {
        script: Vec<(Duration, HubAnnouncement)>,
    }

    impl ScriptedListener {
        fn new(script: Vec<(Duration, HubAnnouncement)>) -> Self {
            Self { script }
        }
    }

    impl AnnouncementListener for ScriptedListener {
        fn start(
            &self,
        ) -> Pin<
            Box<
                dyn Future<Output = Result<mpsc::Receiver<HubAnnouncement>, DiscoveryError>>
                    + Send
                    + '_,
            >,
        > {
            let script = self.script.clone();
            Box::pin(async move {
                let (tx, rx) = mpsc::channel(16);
                tokio::spawn(async move {
                    for (delay, announcement) in script {
                        tokio::time::sleep(delay).await;
                        if tx.send(announcement).await.is_err() {
                            return;
                        }
                    }
                    // Park the sender so the stream stays open until the
                    // window elapses.
                    std::future::pending::<()>().await;
                });
                Ok(rx)
            })
        }

        fn stop(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<(), DiscoveryError>> + Send + '_>> {
            Box::pin(async { Ok(()) })
        }
    }

    // -- scripted transport --------------------------------------------------

    /// Shared behavior knobs for every session the transport opens.
    #[derive(Default)]
    struct TransportScript {
        /// Pops one entry per hold-action send; `true` means fail it.
        action_failures: Mutex<VecDeque<bool>>,
        /// When set, hold-action sends hang until the attempt deadline.
        hang_actions: bool,
        /// Device label served in fetches, to observe refreshes.
        device_label: Mutex<String>,
        opens: AtomicUsize,
        sends: AtomicUsize,
    }

    struct FakeSession {
        script: Arc<TransportScript>,
    }

    impl HubSession for FakeSession {
        fn send<'a>(
            &'a self,
            msg_type: MessageType,
            _payload: Option<&'a serde_json::Value>,
        ) -> Pin<Box<dyn Future<Output = Result<Message, SessionError>> + Send + 'a>> {
            Box::pin(async move {
                self.script.sends.fetch_add(1, Ordering::SeqCst);
                match msg_type {
                    MessageType::GetDevices => {
                        let label = self.script.device_label.lock().unwrap().clone();
                        let payload = serde_json::json!({
                            "devices": [{
                                "id": "tv-1",
                                "label": label,
                                "type": "television",
                                "controlGroups": [{
                                    "name": "Power",
                                    "function": [
                                        {"action": "PowerOn", "label": "Power On"},
                                        {"action": "PowerOff", "label": "Power Off"}
                                    ]
                                }]
                            }]
                        });
                        Ok(Message::new("m", MessageType::DeviceList, Some(&payload))?)
                    }
                    MessageType::GetActivities => {
                        let payload = serde_json::json!({
                            "activities": [
                                {"id": "act-1", "label": "Watch TV", "isCurrent": true}
                            ]
                        });
                        Ok(Message::new("m", MessageType::ActivityList, Some(&payload))?)
                    }
                    MessageType::HoldAction => {
                        if self.script.hang_actions {
                            std::future::pending::<()>().await;
                        }
                        let fail = self
                            .script
                            .action_failures
                            .lock()
                            .unwrap()
                            .pop_front()
                            .unwrap_or(false);
                        if fail {
                            return Err(SessionError::Closed);
                        }
                        Ok(Message::new::<()>("m", MessageType::ActionAck, None)?)
                    }
                    _ => Ok(Message::new::<()>("m", MessageType::Pong, None)?),
                }
            })
        }

        fn close<'a>(
            &'a self,
        ) -> Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send + 'a>> {
            Box::pin(async { Ok(()) })
        }
    }

    struct FakeTransport {
        script: Arc<TransportScript>,
    }

    impl SessionTransport for FakeTransport {
        fn open<'a>(
            &'a self,
            _hub: &'a Hub,
        ) -> Pin<Box<dyn Future<Output = Result<Box<dyn HubSession>, SessionError>> + Send + 'a>>
        {
            Box::pin(async move {
                self.script.opens.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(FakeSession {
                    script: self.script.clone(),
                }) as Box<dyn HubSession>)
            })
        }
    }

    // -- in-memory store -----------------------------------------------------

    #[derive(Default)]
    struct MemStore {
        map: Mutex<std::collections::HashMap<String, String>>,
    }

    impl KvStore for MemStore {
        fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            Ok(self.map.lock().unwrap().get(key).cloned())
        }
        fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
            self.map.lock().unwrap().insert(key.into(), value.into());
            Ok(())
        }
        fn remove(&self, key: &str) -> Result<(), CacheError> {
            self.map.lock().unwrap().remove(key);
            Ok(())
        }
    }

    // -- rig -----------------------------------------------------------------

    struct Rig {
        client: HubClient,
        script: Arc<TransportScript>,
        store: Arc<MemStore>,
    }

    fn build_rig(
        listener: ScriptedListener,
        script: Arc<TransportScript>,
        queue_config: QueueConfig,
    ) -> Rig {
        let transport = Arc::new(FakeTransport {
            script: script.clone(),
        });
        let manager = Arc::new(ConnectionManager::with_config(
            transport,
            SessionConfig::default(),
        ));
        let store = Arc::new(MemStore::default());

        let coordinator = Arc::new(DiscoveryCoordinator::with_config(
            Arc::new(listener),
            DiscoveryConfig {
                window: Duration::from_secs(30),
                grace: Duration::from_secs(10),
            },
        ));

        let client = HubClient::new(
            coordinator,
            manager.clone(),
            CommandQueue::with_config(manager, queue_config),
            SnapshotCache::new(store.clone()),
            Arc::new(NoticeQueue::new()),
        );

        Rig {
            client,
            script,
            store,
        }
    }

    fn fast_queue() -> QueueConfig {
        QueueConfig {
            hold: Duration::from_millis(100),
            attempt_timeout: Duration::from_secs(5),
            retries: 2,
            retry_delay: Duration::from_millis(100),
            ..QueueConfig::default()
        }
    }

    fn default_script() -> Arc<TransportScript> {
        let script = Arc::new(TransportScript::default());
        *script.device_label.lock().unwrap() = "TV".into();
        script
    }

    fn hub(id: &str) -> Hub {
        announcement(id).into_hub()
    }

    // -- the end-to-end flow -------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn discover_connect_fetch_and_execute() {
        let listener = ScriptedListener::new(vec![
            (Duration::from_secs(1), announcement("alpha")),
            (Duration::from_secs(2), announcement("alpha")), // duplicate
            (Duration::from_secs(3), announcement("beta")),
        ]);
        let rig = build_rig(listener, default_script(), fast_queue());

        // Discovery dedupes by hub id and streams each unique hub once.
        let streamed = Arc::new(Mutex::new(Vec::new()));
        let sink = streamed.clone();
        let hubs = rig
            .client
            .discover_hubs(move |hub| sink.lock().unwrap().push(hub.id.clone()))
            .await
            .unwrap();

        let ids: Vec<&str> = hubs.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "beta"]);
        assert_eq!(*streamed.lock().unwrap(), vec!["alpha", "beta"]);
        assert_eq!(rig.client.known_hubs().len(), 2);

        // Connect + fetch populates the cache.
        let snapshot = rig.client.get_session_data(&hubs[0], false).await.unwrap();
        assert_eq!(rig.client.connection_state(), ConnectionState::Connected);
        assert_eq!(snapshot.devices[0].label, "TV");
        assert_eq!(snapshot.activities[0].id, "act-1");
        assert!(snapshot.activities[0].is_current);
        assert_eq!(rig.script.opens.load(Ordering::SeqCst), 1);

        // Commands resolve their wire token from the snapshot.
        let result = rig.client.execute_command("tv-1", "PowerOn").await.unwrap();
        assert_eq!(result.status, CommandStatus::Completed);
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_hit_skips_the_transport() {
        let rig = build_rig(ScriptedListener::new(vec![]), default_script(), fast_queue());
        let hub = hub("alpha");

        rig.client.get_session_data(&hub, false).await.unwrap();
        let sends_after_fetch = rig.script.sends.load(Ordering::SeqCst);

        let cached = rig.client.get_session_data(&hub, false).await.unwrap();
        assert_eq!(cached.devices[0].label, "TV");
        assert_eq!(
            rig.script.sends.load(Ordering::SeqCst),
            sends_after_fetch,
            "cache hit must not touch the transport"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn forced_refresh_overwrites_the_cache() {
        let script = default_script();
        let rig = build_rig(ScriptedListener::new(vec![]), script.clone(), fast_queue());
        let hub = hub("alpha");

        rig.client.get_session_data(&hub, false).await.unwrap();

        // The hub changes; a plain load still serves the stale snapshot,
        // a forced refresh re-fetches and overwrites it.
        *script.device_label.lock().unwrap() = "New TV".into();

        let stale = rig.client.get_session_data(&hub, false).await.unwrap();
        assert_eq!(stale.devices[0].label, "TV");

        let fresh = rig.client.get_session_data(&hub, true).await.unwrap();
        assert_eq!(fresh.devices[0].label, "New TV");

        let cached_again = rig.client.get_session_data(&hub, false).await.unwrap();
        assert_eq!(cached_again.devices[0].label, "New TV");
    }

    #[tokio::test(start_paused = true)]
    async fn expired_snapshot_triggers_a_refetch() {
        let rig = build_rig(ScriptedListener::new(vec![]), default_script(), fast_queue());
        let hub = hub("alpha");

        rig.client.get_session_data(&hub, false).await.unwrap();
        let opens_after_fetch = rig.script.opens.load(Ordering::SeqCst);

        // Age the stored record past the 24h TTL.
        {
            let mut map = rig.store.map.lock().unwrap();
            let raw = map.get("session-snapshot").unwrap().clone();
            let mut snapshot: CachedSnapshot = serde_json::from_str(&raw).unwrap();
            snapshot.fetched_at = chrono::Utc::now() - chrono::Duration::hours(25);
            map.insert(
                "session-snapshot".into(),
                serde_json::to_string(&snapshot).unwrap(),
            );
        }

        rig.client.get_session_data(&hub, false).await.unwrap();
        assert!(rig.script.sends.load(Ordering::SeqCst) > 0);
        // Still the same connection; only the fetches re-ran.
        assert_eq!(rig.script.opens.load(Ordering::SeqCst), opens_after_fetch);
    }

    #[tokio::test(start_paused = true)]
    async fn corrupt_cache_record_is_refetched() {
        let rig = build_rig(ScriptedListener::new(vec![]), default_script(), fast_queue());
        let hub = hub("alpha");

        rig.client.get_session_data(&hub, false).await.unwrap();
        rig.store
            .map
            .lock()
            .unwrap()
            .insert("session-snapshot".into(), "{ broken".into());

        // Corruption reads as a miss, never as an error.
        let snapshot = rig.client.get_session_data(&hub, false).await.unwrap();
        assert_eq!(snapshot.devices[0].label, "TV");
    }

    #[tokio::test(start_paused = true)]
    async fn command_retries_until_success() {
        let script = default_script();
        script
            .action_failures
            .lock()
            .unwrap()
            .push_back(true); // first press fails
        let rig = build_rig(ScriptedListener::new(vec![]), script, fast_queue());
        let hub = hub("alpha");

        rig.client.get_session_data(&hub, false).await.unwrap();
        let result = rig.client.execute_command("tv-1", "PowerOn").await.unwrap();

        assert_eq!(result.status, CommandStatus::Completed);
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_hub_times_the_command_out() {
        let script = Arc::new(TransportScript {
            hang_actions: true,
            ..TransportScript::default()
        });
        *script.device_label.lock().unwrap() = "TV".into();
        let rig = build_rig(ScriptedListener::new(vec![]), script, fast_queue());
        let hub = hub("alpha");

        rig.client.get_session_data(&hub, false).await.unwrap();
        let result = rig.client.execute_command("tv-1", "PowerOn").await.unwrap();

        assert_eq!(result.status, CommandStatus::TimedOut);
        assert_eq!(result.attempts, 3);
        assert!(result.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cache_forces_full_reload() {
        let rig = build_rig(ScriptedListener::new(vec![]), default_script(), fast_queue());
        let hub = hub("alpha");

        rig.client.get_session_data(&hub, false).await.unwrap();
        rig.client.clear_cache().await.unwrap();

        assert_eq!(rig.client.connection_state(), ConnectionState::Disconnected);
        assert!(rig.store.map.lock().unwrap().is_empty());

        rig.client.get_session_data(&hub, false).await.unwrap();
        assert_eq!(rig.script.opens.load(Ordering::SeqCst), 2);
    }
}
