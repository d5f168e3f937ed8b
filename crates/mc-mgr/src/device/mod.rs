//! Per-device tree manager: the shadow, its registries and the
//! orchestrator that turns API calls into staged hardware writes.

mod orch;
pub(crate) mod page;
pub(crate) mod state;

pub use orch::{McOrch, McOrchConfig};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use mc_hal::{SimHardware, SimHardwareConfig};

    use super::{McOrch, McOrchConfig};
    use crate::session::{SessionId, SessionManager};

    /// A small simulated device with one open session.
    pub(crate) struct Harness {
        pub hw: Arc<SimHardware>,
        pub orch: McOrch,
        pub sess: SessionId,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with(|_| {})
        }

        pub fn with(tweak: impl FnOnce(&mut McOrchConfig)) -> Self {
            let mut config = McOrchConfig {
                pipe_count: 2,
                ports_per_pipe: 16,
                max_mgrps: 64,
                max_nodes: 64,
                max_ecmps: 16,
                lag_table_size: 16,
                reserved_lag_id: None,
                prune_table_size: 16,
                cells_per_pipe: 256,
                ..McOrchConfig::default()
            };
            tweak(&mut config);
            let hw = Arc::new(SimHardware::new(SimHardwareConfig {
                dev: config.dev,
                pipe_count: config.pipe_count,
                ..SimHardwareConfig::default()
            }));
            let sessions = Arc::new(SessionManager::new(Duration::from_millis(200)));
            let orch = McOrch::new(config, hw.clone(), sessions.clone()).unwrap();
            let sess = sessions.create_session();
            Self { hw, orch, sess }
        }
    }
}
