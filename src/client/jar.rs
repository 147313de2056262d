use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::session::CookieRecord;

/// Cookie storage visible to a client runtime.
pub trait ClientCookieJar: Send + Sync {
    /// Apply outbound records. Removal records delete the named cookie.
    fn apply(&self, records: &[CookieRecord]);

    /// Every cookie currently held.
    fn records(&self) -> Vec<CookieRecord>;
}

/// In-process jar keyed by cookie name.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: Mutex<BTreeMap<String, CookieRecord>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<CookieRecord> {
        self.cookies.lock().get(name).cloned()
    }

    /// Store a cookie as if a page script or an older build had set it.
    pub fn insert(&self, name: impl Into<String>, value: impl Into<String>) {
        let record = CookieRecord::incoming(name, value);
        self.cookies.lock().insert(record.name.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.cookies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.lock().is_empty()
    }
}

impl ClientCookieJar for MemoryCookieJar {
    fn apply(&self, records: &[CookieRecord]) {
        let mut cookies = self.cookies.lock();
        for record in records {
            if record.is_removal() {
                cookies.remove(&record.name);
            } else {
                cookies.insert(record.name.clone(), record.clone());
            }
        }
    }

    fn records(&self) -> Vec<CookieRecord> {
        self.cookies.lock().values().cloned().collect()
    }
}
