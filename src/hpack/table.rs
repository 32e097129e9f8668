//! HPACK indexing tables
//!
//! The fixed 61-entry static table from RFC 7541 Appendix A and the
//! per-direction dynamic table. Index space is shared: 1..=61 addresses the
//! static table, 62.. addresses the dynamic table with the most recently
//! inserted entry first.

use std::collections::VecDeque;

/// Per-entry size overhead in bytes (RFC 7541 Section 4.1)
pub const ENTRY_OVERHEAD: usize = 32;

/// A (name, value) header pair
///
/// Names are matched case-insensitively wherever entries are compared; the
/// encoder is responsible for putting lowercase names on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderEntry {
    /// Header name
    pub name: String,
    /// Header value
    pub value: String,
}

impl HeaderEntry {
    /// Create a new header entry
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        HeaderEntry {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Table size of this entry: name + value + the fixed 32-byte overhead
    pub fn size(&self) -> usize {
        self.name.len() + self.value.len() + ENTRY_OVERHEAD
    }
}

/// Static table entries as defined in RFC 7541 Appendix A, indices 1..=61
pub const STATIC_TABLE: [(&str, &str); 61] = [
    (":authority", ""),
    (":method", "GET"),
    (":method", "POST"),
    (":path", "/"),
    (":path", "/index.html"),
    (":scheme", "http"),
    (":scheme", "https"),
    (":status", "200"),
    (":status", "204"),
    (":status", "206"),
    (":status", "304"),
    (":status", "400"),
    (":status", "404"),
    (":status", "500"),
    ("accept-charset", ""),
    ("accept-encoding", "gzip, deflate"),
    ("accept-language", ""),
    ("accept-ranges", ""),
    ("accept", ""),
    ("access-control-allow-origin", ""),
    ("age", ""),
    ("allow", ""),
    ("authorization", ""),
    ("cache-control", ""),
    ("content-disposition", ""),
    ("content-encoding", ""),
    ("content-language", ""),
    ("content-length", ""),
    ("content-location", ""),
    ("content-range", ""),
    ("content-type", ""),
    ("cookie", ""),
    ("date", ""),
    ("etag", ""),
    ("expect", ""),
    ("expires", ""),
    ("from", ""),
    ("host", ""),
    ("if-match", ""),
    ("if-modified-since", ""),
    ("if-none-match", ""),
    ("if-range", ""),
    ("if-unmodified-since", ""),
    ("last-modified", ""),
    ("link", ""),
    ("location", ""),
    ("max-forwards", ""),
    ("proxy-authenticate", ""),
    ("proxy-authorization", ""),
    ("range", ""),
    ("referer", ""),
    ("refresh", ""),
    ("retry-after", ""),
    ("server", ""),
    ("set-cookie", ""),
    ("strict-transport-security", ""),
    ("transfer-encoding", ""),
    ("user-agent", ""),
    ("vary", ""),
    ("via", ""),
    ("www-authenticate", ""),
];

/// Look up a static table entry by 1-based index
pub fn static_entry(index: usize) -> Option<HeaderEntry> {
    if index == 0 || index > STATIC_TABLE.len() {
        None
    } else {
        let (name, value) = STATIC_TABLE[index - 1];
        Some(HeaderEntry::new(name, value))
    }
}

/// Find an exact (name, value) match in the static table
pub fn find_static(name: &str, value: &str) -> Option<usize> {
    STATIC_TABLE
        .iter()
        .position(|(n, v)| n.eq_ignore_ascii_case(name) && *v == value)
        .map(|i| i + 1)
}

/// Find a name-only match in the static table
pub fn find_static_name(name: &str) -> Option<usize> {
    STATIC_TABLE
        .iter()
        .position(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|i| i + 1)
}

/// The HPACK dynamic table: recently seen headers, most recent first,
/// bounded by a byte budget.
///
/// Inserting prepends and evicts from the tail until the budget holds; an
/// entry larger than the whole budget empties the table and is not stored.
/// The budget can change at runtime (SETTINGS_HEADER_TABLE_SIZE or a
/// dynamic-table-size-update instruction), evicting as needed.
#[derive(Debug, Clone)]
pub struct DynamicTable {
    entries: VecDeque<HeaderEntry>,
    size: usize,
    max_size: usize,
}

impl DynamicTable {
    /// Create a dynamic table with the given byte budget
    pub fn new(max_size: usize) -> Self {
        DynamicTable {
            entries: VecDeque::new(),
            size: 0,
            max_size,
        }
    }

    /// Current occupied size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Current byte budget
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Change the byte budget, evicting oldest entries to fit
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.evict_to_fit(0);
    }

    /// Insert a new entry at the front, evicting from the back as needed
    pub fn insert(&mut self, entry: HeaderEntry) {
        let entry_size = entry.size();
        self.evict_to_fit(entry_size);

        // An entry larger than the whole budget leaves the table empty.
        if entry_size <= self.max_size {
            self.size += entry_size;
            self.entries.push_front(entry);
        }
    }

    /// Get an entry by 0-based position from the front (most recent = 0)
    pub fn get(&self, position: usize) -> Option<&HeaderEntry> {
        self.entries.get(position)
    }

    /// Find an exact (name, value) match; returns the 0-based position
    pub fn find(&self, name: &str, value: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.name.eq_ignore_ascii_case(name) && e.value == value)
    }

    /// Find a name-only match; returns the 0-based position
    pub fn find_name(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.name.eq_ignore_ascii_case(name))
    }

    fn evict_to_fit(&mut self, incoming: usize) {
        while self.size + incoming > self.max_size {
            match self.entries.pop_back() {
                Some(evicted) => self.size -= evicted.size(),
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_table_bounds() {
        assert_eq!(static_entry(0), None);
        assert_eq!(static_entry(62), None);

        let first = static_entry(1).unwrap();
        assert_eq!(first.name, ":authority");

        let last = static_entry(61).unwrap();
        assert_eq!(last.name, "www-authenticate");
    }

    #[test]
    fn test_static_lookups() {
        assert_eq!(find_static(":method", "GET"), Some(2));
        assert_eq!(find_static(":status", "404"), Some(13));
        assert_eq!(find_static(":method", "PATCH"), None);

        assert_eq!(find_static_name(":method"), Some(2));
        assert_eq!(find_static_name("content-type"), Some(31));
        assert_eq!(find_static_name("x-custom"), None);
    }

    #[test]
    fn test_static_lookup_is_case_insensitive() {
        assert_eq!(find_static_name("Content-Type"), Some(31));
        assert_eq!(find_static("ACCEPT-ENCODING", "gzip, deflate"), Some(16));
    }

    #[test]
    fn test_entry_size_includes_overhead() {
        let entry = HeaderEntry::new("custom-header", "custom-value");
        assert_eq!(entry.size(), 13 + 12 + 32);
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut table = DynamicTable::new(4096);
        table.insert(HeaderEntry::new("x-first", "1"));
        table.insert(HeaderEntry::new("x-second", "2"));

        // Most recent entry is position 0
        assert_eq!(table.get(0).unwrap().name, "x-second");
        assert_eq!(table.get(1).unwrap().name, "x-first");
        assert_eq!(table.find("x-first", "1"), Some(1));
        assert_eq!(table.find_name("X-SECOND"), Some(0));
    }

    #[test]
    fn test_eviction_keeps_budget() {
        // Each entry is 32 + 7 + 1 = 40 bytes
        let mut table = DynamicTable::new(100);
        table.insert(HeaderEntry::new("x-aaaaa", "1"));
        table.insert(HeaderEntry::new("x-bbbbb", "2"));
        assert_eq!(table.len(), 2);
        assert_eq!(table.size(), 80);

        // Third insert evicts the oldest
        table.insert(HeaderEntry::new("x-ccccc", "3"));
        assert_eq!(table.len(), 2);
        assert!(table.size() <= 100);
        assert_eq!(table.find_name("x-aaaaa"), None);
        assert_eq!(table.get(0).unwrap().name, "x-ccccc");
    }

    #[test]
    fn test_oversized_entry_empties_table() {
        let mut table = DynamicTable::new(64);
        table.insert(HeaderEntry::new("x-small", "v"));
        assert_eq!(table.len(), 1);

        let big_value = "v".repeat(100);
        table.insert(HeaderEntry::new("x-big", big_value));
        assert!(table.is_empty());
        assert_eq!(table.size(), 0);
    }

    #[test]
    fn test_shrinking_budget_evicts() {
        let mut table = DynamicTable::new(4096);
        for i in 0..10 {
            table.insert(HeaderEntry::new(format!("x-header-{i}"), "value"));
        }
        assert_eq!(table.len(), 10);

        table.set_max_size(100);
        assert!(table.size() <= 100);
        assert!(table.len() < 10);

        table.set_max_size(0);
        assert!(table.is_empty());
    }

    #[test]
    fn test_size_never_exceeds_budget() {
        let mut table = DynamicTable::new(200);
        for i in 0..50 {
            table.insert(HeaderEntry::new(format!("h{i}"), format!("value-{i}")));
            assert!(table.size() <= table.max_size());
        }
    }
}
