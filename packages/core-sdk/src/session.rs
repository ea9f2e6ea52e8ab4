use crate::{gate::Credential, models::ResultRecord, telemetry};

/**
 * \brief Ordered, append-only log of result records for one session.
 */
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResultLog {
    records: Vec<ResultRecord>,
}

impl ResultLog {
    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn push(&mut self, record: ResultRecord) {
        self.records.push(record);
    }

    fn clear(&mut self) {
        self.records.clear();
    }
}

/**
 * \brief Session-scoped state: gate status, held API key and accumulated results.
 * \details Created at session start and passed by reference to every entry point.
 */
#[derive(Debug, Default)]
pub struct Session {
    unlocked: bool,
    credential: Option<Credential>,
    results: ResultLog,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /** \brief Whether the gate has succeeded since the last disconnect. */
    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    pub fn results(&self) -> &ResultLog {
        &self.results
    }

    pub(crate) fn results_mut(&mut self) -> &mut ResultLog {
        &mut self.results
    }

    pub(crate) fn unlock(&mut self, credential: Credential) {
        self.unlocked = true;
        self.credential = Some(credential);
    }

    /**
     * \brief Move the key out of the session; it is gone from session state from here on.
     */
    pub(crate) fn take_credential(&mut self) -> Option<Credential> {
        self.credential.take()
    }

    /**
     * \brief Lock the session again and drop the held key. Results are kept.
     */
    pub fn disconnect(&mut self) {
        self.unlocked = false;
        self.credential = None;
        telemetry::log_event("session", "disconnected");
    }

    pub fn reset_results(&mut self) {
        let dropped = self.results.len();
        self.results.clear();
        telemetry::log_event("session", &format!("results reset, dropped={}", dropped));
    }
}
