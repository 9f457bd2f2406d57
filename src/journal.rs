//! Replication stream builder (component E): a deterministic,
//! append-only RESP event log plus the monotonic `master_repl_offset`.

use crate::resp::{encode, ProtoVer, Reply};

#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub bytes: Vec<u8>,
    pub db_index: usize,
}

pub struct Journal {
    events: Vec<JournalEntry>,
    offset: u64,
    last_selected_db: Option<usize>,
    tx_buffer: Option<Vec<(usize, Vec<u8>)>>,
}

impl Journal {
    pub fn new() -> Journal {
        Journal {
            events: Vec::new(),
            offset: 0,
            last_selected_db: None,
            tx_buffer: None,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn entries_from(&self, idx: usize) -> &[JournalEntry] {
        &self.events[idx.min(self.events.len())..]
    }

    /// Advances the offset by the encoded byte length of the *original*
    /// request: offsets track what the client sent, not the deterministic
    /// rewrite that may replace it in the replication stream.
    pub fn account_original(&mut self, original_request: &[Vec<u8>]) {
        self.offset += encode_request_len(original_request) as u64;
    }

    pub fn begin_transaction(&mut self) {
        self.tx_buffer = Some(Vec::new());
    }

    /// Rolls back a dirtied/aborted transaction's buffered writes.
    pub fn discard_transaction(&mut self) {
        self.tx_buffer = None;
    }

    pub fn commit_transaction(&mut self) {
        let buffered = self.tx_buffer.take().unwrap_or_default();
        if buffered.is_empty() {
            return;
        }
        if buffered.len() == 1 {
            let (db, bytes) = buffered.into_iter().next().unwrap();
            self.push_raw(db, bytes);
            return;
        }
        let db = buffered[0].0;
        self.push_raw(db, encode_command(&[b"MULTI".to_vec()]));
        for (db_idx, bytes) in buffered {
            self.push_raw(db_idx, bytes);
        }
        self.push_raw(db, encode_command(&[b"EXEC".to_vec()]));
    }

    /// Appends one rewritten write command, inserting a `SELECT` event
    /// first if the target db changed since the last append.
    pub fn append_write(&mut self, db_index: usize, command: &[Vec<u8>]) {
        let bytes = encode_command(command);
        if self.tx_buffer.is_some() {
            self.maybe_select_buffered(db_index);
            self.tx_buffer.as_mut().unwrap().push((db_index, bytes));
        } else {
            self.maybe_select(db_index);
            self.push_raw(db_index, bytes);
        }
    }

    fn maybe_select(&mut self, db_index: usize) {
        if self.last_selected_db != Some(db_index) {
            let sel = encode_command(&[b"SELECT".to_vec(), db_index.to_string().into_bytes()]);
            self.push_raw(db_index, sel);
            self.last_selected_db = Some(db_index);
        }
    }

    fn maybe_select_buffered(&mut self, db_index: usize) {
        let needs = match self.tx_buffer.as_ref().and_then(|b| b.last()) {
            Some((last_db, _)) => *last_db != db_index,
            None => self.last_selected_db != Some(db_index),
        };
        if needs {
            let sel = encode_command(&[b"SELECT".to_vec(), db_index.to_string().into_bytes()]);
            self.tx_buffer.as_mut().unwrap().push((db_index, sel));
            self.last_selected_db = Some(db_index);
        }
    }

    fn push_raw(&mut self, db_index: usize, bytes: Vec<u8>) {
        self.events.push(JournalEntry { bytes, db_index });
    }
}

impl Default for Journal {
    fn default() -> Self {
        Journal::new()
    }
}

pub fn encode_command(argv: &[Vec<u8>]) -> Vec<u8> {
    let items: Vec<Reply> = argv.iter().map(|a| Reply::from_bytes(a.clone())).collect();
    encode(&Reply::Array(items), ProtoVer::Resp2)
}

fn encode_request_len(argv: &[Vec<u8>]) -> usize {
    encode_command(argv).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_accounts_original_request_length() {
        let mut j = Journal::new();
        let original = vec![b"SET".to_vec(), b"k".to_vec(), b"v".to_vec(), b"EX".to_vec(), b"10".to_vec()];
        let before = j.offset();
        j.account_original(&original);
        assert_eq!(j.offset() - before, encode_request_len(&original) as u64);
    }

    #[test]
    fn select_inserted_on_db_switch() {
        let mut j = Journal::new();
        j.append_write(0, &[b"SET".to_vec(), b"a".to_vec(), b"1".to_vec()]);
        j.append_write(1, &[b"SET".to_vec(), b"b".to_vec(), b"2".to_vec()]);
        assert_eq!(j.len(), 3);
        assert!(j.entries_from(0)[0].bytes.starts_with(b"*3\r\n$6\r\nSELECT"));
    }

    #[test]
    fn transaction_with_multiple_writes_is_bracketed() {
        let mut j = Journal::new();
        j.begin_transaction();
        j.append_write(0, &[b"SET".to_vec(), b"a".to_vec(), b"1".to_vec()]);
        j.append_write(0, &[b"SET".to_vec(), b"b".to_vec(), b"2".to_vec()]);
        j.commit_transaction();
        assert_eq!(j.len(), 4);
        assert!(j.entries_from(0)[0].bytes.starts_with(b"*1\r\n$5\r\nMULTI"));
        assert!(j.entries_from(0)[3].bytes.starts_with(b"*1\r\n$4\r\nEXEC"));
    }

    #[test]
    fn single_write_transaction_is_not_bracketed() {
        let mut j = Journal::new();
        j.begin_transaction();
        j.append_write(0, &[b"SET".to_vec(), b"a".to_vec(), b"1".to_vec()]);
        j.commit_transaction();
        assert_eq!(j.len(), 1);
    }
}
