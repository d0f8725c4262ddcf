use crate::engine::{MatchEngine, MatchOutcome};
use crate::operator::{KeyWait, Operator};
use crate::prompt;
use handover_device::{
    list_connected, DeviceError, DeviceProbe, IdentityResolver, ResolveEvent, Sleeper,
};
use handover_storage::AgreementStore;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MANUAL_WINDOW: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub manual_window: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            manual_window: DEFAULT_MANUAL_WINDOW,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub devices: usize,
    pub manual_entry: bool,
    pub outcomes: Vec<MatchOutcome>,
    pub shutdown: bool,
}

pub struct PollLoop<P, S, O> {
    resolver: IdentityResolver<P, S>,
    operator: O,
    engine: MatchEngine,
    store: AgreementStore,
    settings: PollSettings,
}

impl<P, S, O> PollLoop<P, S, O>
where
    P: DeviceProbe,
    S: Sleeper,
    O: Operator,
{
    pub fn new(
        resolver: IdentityResolver<P, S>,
        operator: O,
        engine: MatchEngine,
        store: AgreementStore,
        settings: PollSettings,
    ) -> Self {
        Self {
            resolver,
            operator,
            engine,
            store,
            settings,
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &AgreementStore {
        &self.store
    }

    #[cfg(test)]
    pub fn operator(&self) -> &O {
        &self.operator
    }

    /// Runs cycles until the operator interrupts from the key window.
    pub fn run(&mut self) {
        let mut cycles: u64 = 0;
        loop {
            cycles += 1;
            let report = self.run_cycle();
            debug!(
                event = "cycle_done",
                cycle = cycles,
                devices = report.devices,
                manual_entry = report.manual_entry,
                processed = report.outcomes.len()
            );
            if report.shutdown {
                info!(event = "poll_loop_stopped", cycles);
                return;
            }
            self.operator.say("Waiting for new device...");
            self.resolver.sleeper().sleep(self.settings.interval);
        }
    }

    /// One enumeration pass: every attached device in order, or the manual
    /// entry window when none are attached.
    pub fn run_cycle(&mut self) -> CycleReport {
        let devices = list_connected(self.resolver.probe());
        let mut report = CycleReport {
            devices: devices.len(),
            ..CycleReport::default()
        };

        if devices.is_empty() {
            self.operator
                .say("No iPads found. Press 'M' to manually enter a serial number.");
            match self.operator.wait_for_key(self.settings.manual_window) {
                KeyWait::Pressed(key) if key.eq_ignore_ascii_case(&'m') => {
                    report.manual_entry = true;
                    let serial = prompt::manual_serial(&mut self.operator);
                    let outcome =
                        self.engine
                            .process(&mut self.store, &mut self.operator, serial.as_deref());
                    debug!(event = "device_processed", source = "manual", outcome = %outcome);
                    report.outcomes.push(outcome);
                }
                KeyWait::Interrupted => report.shutdown = true,
                KeyWait::Pressed(_) | KeyWait::TimedOut => {}
            }
            return report;
        }

        for device in devices {
            self.operator
                .say(&format!("Checking device with UDID: {device}"));
            let operator = &mut self.operator;
            let resolution = self
                .resolver
                .resolve_with(&device, |event| announce(operator, event));
            let outcome = self.engine.process(
                &mut self.store,
                &mut self.operator,
                resolution.serial(),
            );
            debug!(event = "device_processed", handle = %device, outcome = %outcome);
            report.outcomes.push(outcome);
        }

        report
    }
}

fn announce<O: Operator + ?Sized>(operator: &mut O, event: ResolveEvent<'_>) {
    match event {
        ResolveEvent::AttemptFailed {
            error: DeviceError::TrustPending { .. },
            ..
        } => {
            operator.say("Please unlock the device and confirm the 'Trust This Computer' prompt.");
        }
        ResolveEvent::AttemptFailed { handle, error, .. } => {
            operator.say(&format!("Could not read device {handle}: {error}"));
        }
        ResolveEvent::RetryScheduled {
            delay, remaining, ..
        } => {
            operator.say(&format!(
                "Retrying in {} seconds... ({remaining} retries left)",
                delay.as_secs()
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Menus;
    use crate::operator::testing::ScriptedOperator;
    use handover_device::RetryPolicy;
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};
    use std::fs;
    use tempfile::{tempdir, TempDir};

    #[derive(Default)]
    struct FakeProbe {
        handles: Vec<String>,
        info: RefCell<HashMap<String, VecDeque<Result<String, DeviceError>>>>,
    }

    impl FakeProbe {
        fn with_device(mut self, handle: &str, replies: Vec<Result<String, DeviceError>>) -> Self {
            self.handles.push(handle.to_string());
            self.info
                .borrow_mut()
                .insert(handle.to_string(), replies.into());
            self
        }
    }

    impl DeviceProbe for FakeProbe {
        fn list_handles(&self) -> Result<Vec<String>, DeviceError> {
            Ok(self.handles.clone())
        }

        fn query_info(&self, handle: &str) -> Result<String, DeviceError> {
            self.info
                .borrow_mut()
                .get_mut(handle)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| {
                    Err(DeviceError::Command {
                        program: "ideviceinfo".to_string(),
                        details: "No device found".to_string(),
                    })
                })
        }
    }

    #[derive(Default)]
    struct CountingSleeper {
        slept: RefCell<Vec<Duration>>,
    }

    impl Sleeper for CountingSleeper {
        fn sleep(&self, duration: Duration) {
            self.slept.borrow_mut().push(duration);
        }
    }

    fn store_with(rows: &[&str]) -> (TempDir, AgreementStore) {
        let dir = tempdir().expect("tempdir");
        let mut contents = String::from("elev,serial_number,confirmed,status,school\n");
        for row in rows {
            contents.push_str(row);
            contents.push('\n');
        }
        fs::write(dir.path().join("batch.csv"), contents).expect("seed");
        let store = AgreementStore::load(dir.path()).expect("load");
        (dir, store)
    }

    fn poll_loop(
        probe: FakeProbe,
        operator: ScriptedOperator,
        store: AgreementStore,
    ) -> PollLoop<FakeProbe, CountingSleeper, ScriptedOperator> {
        PollLoop::new(
            IdentityResolver::new(probe, CountingSleeper::default(), RetryPolicy::default()),
            operator,
            MatchEngine::new(Menus::default()),
            store,
            PollSettings::default(),
        )
    }

    fn serial_info(serial: &str) -> Result<String, DeviceError> {
        Ok(format!("DeviceClass: iPad\nSerialNumber: {serial}\n"))
    }

    #[test]
    fn devices_are_processed_in_enumeration_order() {
        let (_dir, store) = store_with(&["Kari,SN1,,,", "Ola,SN2,,,"]);
        let probe = FakeProbe::default()
            .with_device("udid-b", vec![serial_info("sn2")])
            .with_device("udid-a", vec![serial_info("sn1")]);
        let operator = ScriptedOperator::with_answers(["1", "2", "", ""]);
        let mut poll = poll_loop(probe, operator, store);

        let report = poll.run_cycle();
        assert_eq!(report.devices, 2);
        let serials: Vec<_> = report
            .outcomes
            .iter()
            .map(|outcome| match outcome {
                MatchOutcome::Updated { serial, .. } => serial.as_str(),
                other => panic!("unexpected outcome {other:?}"),
            })
            .collect();
        assert_eq!(serials, vec!["SN2", "SN1"]);
        assert_eq!(poll.store().confirmed_count(), 2);
        assert!(poll.operator().said("Checking device with UDID: udid-b"));
    }

    #[test]
    fn unresolved_device_is_skipped_and_next_one_processed() {
        let (_dir, store) = store_with(&["Kari,SN1,,,"]);
        let pending = || {
            Err(DeviceError::TrustPending {
                handle: "udid-locked".to_string(),
            })
        };
        let probe = FakeProbe::default()
            .with_device("udid-locked", vec![pending(), pending(), pending()])
            .with_device("udid-ok", vec![serial_info("SN1")]);
        let operator = ScriptedOperator::with_answers(["1", "1"]);
        let mut poll = poll_loop(probe, operator, store);

        let report = poll.run_cycle();
        assert_eq!(report.outcomes[0], MatchOutcome::Unresolved);
        assert!(matches!(report.outcomes[1], MatchOutcome::Updated { .. }));

        let operator = poll.operator();
        assert!(operator.said("Trust This Computer"));
        assert!(operator.said("Retrying in 5 seconds... (2 retries left)"));
        assert!(operator.said("Retrying in 5 seconds... (1 retries left)"));
        assert!(operator.said("Could not retrieve serial number."));
        assert_eq!(poll.resolver.sleeper().slept.borrow().len(), 2);
    }

    #[test]
    fn empty_enumeration_offers_manual_entry() {
        let (_dir, store) = store_with(&["Kari,DMPX12AB,,,"]);
        let mut operator = ScriptedOperator::with_answers([" dmpx12ab", "2", "3"]);
        operator.keys.push_back(KeyWait::Pressed('M'));
        let mut poll = poll_loop(FakeProbe::default(), operator, store);

        let report = poll.run_cycle();
        assert!(report.manual_entry);
        assert_eq!(
            report.outcomes,
            vec![MatchOutcome::Updated {
                serial: "DMPX12AB".to_string(),
                status: Some("Sprekk".to_string()),
                school: Some("Breilia skole".to_string()),
            }]
        );
        assert!(poll.operator().said("No iPads found."));
    }

    #[test]
    fn other_keys_or_timeout_skip_manual_entry() {
        let (_dir, store) = store_with(&["Kari,SN1,,,"]);
        let mut operator = ScriptedOperator::default();
        operator.keys.push_back(KeyWait::Pressed('x'));
        let mut poll = poll_loop(FakeProbe::default(), operator, store);

        let first = poll.run_cycle();
        let second = poll.run_cycle();
        assert!(!first.manual_entry && !second.manual_entry);
        assert!(first.outcomes.is_empty() && second.outcomes.is_empty());
        assert!(poll.operator().prompts.is_empty());
    }

    #[test]
    fn interrupt_key_stops_the_loop() {
        let (_dir, store) = store_with(&["Kari,SN1,,,"]);
        let mut operator = ScriptedOperator::default();
        operator.keys.push_back(KeyWait::TimedOut);
        operator.keys.push_back(KeyWait::Interrupted);
        let mut poll = poll_loop(FakeProbe::default(), operator, store);

        poll.run();

        let waits = poll
            .operator()
            .transcript
            .iter()
            .filter(|line| line.as_str() == "Waiting for new device...")
            .count();
        assert_eq!(waits, 1);
        assert_eq!(
            *poll.resolver.sleeper().slept.borrow(),
            vec![DEFAULT_POLL_INTERVAL]
        );
    }
}
