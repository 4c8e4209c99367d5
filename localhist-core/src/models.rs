use crate::config::Retention;
use crate::diff::{apply_patch, create_patch};
use crate::error::{Error, PatchError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A delta between two consecutive states of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub content: String,
    #[serde(with = "epoch_millis")]
    pub date: DateTime<Utc>,
}

impl Patch {
    pub fn new(content: String) -> Self {
        Self {
            content,
            date: Utc::now(),
        }
    }

    pub fn between(old: &str, new: &str) -> Self {
        Self::new(create_patch(old, new))
    }

    /// The sentinel every commit starts with; applies as a no-op.
    pub fn null() -> Self {
        Self::between("", "")
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    pub fn apply(&self, base: &str) -> std::result::Result<String, PatchError> {
        apply_patch(base, &self.content)
    }
}

/// A named snapshot plus the patches recorded on top of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub name: String,
    /// Full text at the time the commit was taken.
    pub content: String,
    pub active_patch_index: usize,
    #[serde(with = "epoch_millis")]
    pub date: DateTime<Utc>,
    pub patches: Vec<Patch>,
}

impl Commit {
    pub fn new(name: String, content: String) -> Self {
        let date = Utc::now();
        Self {
            name,
            content,
            active_patch_index: 0,
            date,
            patches: vec![Patch::null().with_date(date)],
        }
    }

    /// Date of the newest patch, which is the commit date while only the
    /// sentinel exists.
    pub fn last_recorded(&self) -> DateTime<Utc> {
        self.patches.last().map_or(self.date, |patch| patch.date)
    }

    /// Rebuilds the text after `patches[0..=index]` by replaying each patch
    /// in order on top of the snapshot.
    pub fn get_patched(&self, index: usize) -> Result<String> {
        if index >= self.patches.len() {
            return Err(Error::out_of_range("patch", index, self.patches.len()));
        }

        let mut patched = self.content.clone();
        for (i, patch) in self.patches[..=index].iter().enumerate() {
            patched = patch
                .apply(&patched)
                .map_err(|source| Error::PatchApply { index: i, source })?;
        }
        Ok(patched)
    }

    /// Text of the state this commit currently points at.
    pub fn current_content(&self) -> Result<String> {
        self.get_patched(self.active_patch_index)
    }

    /// Appends `patch` after the active one. Patches past the active index
    /// are discarded first, so editing after a restore forks the history.
    pub fn append_patch(&mut self, patch: Patch, retention: Retention) -> Result<()> {
        let discarded = self.patches.len() - (self.active_patch_index + 1);
        if discarded > 0 {
            debug!(commit = %self.name, discarded, "Truncating patches after restore point");
        }
        self.patches.truncate(self.active_patch_index + 1);
        self.patches.push(patch);

        if let Some(max) = retention.max_patches {
            self.prune(max)?;
        }

        self.active_patch_index = self.patches.len() - 1;
        Ok(())
    }

    /// Drops the oldest non-sentinel patches until at most `max` remain.
    ///
    /// A dropped patch is folded into its successor so that the remaining
    /// patches still replay from the snapshot; only the intermediate state
    /// it produced is lost.
    fn prune(&mut self, max: usize) -> Result<()> {
        while self.patches.len() > max.max(2) {
            let folded = self.get_patched(2)?;
            let date = self.patches[2].date;
            self.patches[2] = Patch::between(&self.content, &folded).with_date(date);
            self.patches.remove(1);
        }
        Ok(())
    }

    /// Removes every patch except the sentinel.
    pub fn clear_patches(&mut self) {
        self.patches.truncate(1);
        self.active_patch_index = 0;
    }

    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        if self.patches.is_empty() {
            return Err(format!("commit {:?} has no sentinel patch", self.name));
        }
        if self.active_patch_index >= self.patches.len() {
            return Err(format!(
                "commit {:?} active patch {} out of range ({} patches)",
                self.name,
                self.active_patch_index,
                self.patches.len()
            ));
        }
        Ok(())
    }
}

/// What a recorded edit did to the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EditOutcome {
    Ignored,
    Debounced,
    Unchanged,
    Committed { commit: usize },
    Patched { commit: usize, patch: usize },
}

/// The full history of one tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchChain {
    /// Path of the tracked file relative to the workspace root.
    pub source_file: String,
    #[serde(rename = "activeCommit")]
    pub active_commit_index: usize,
    pub commits: Vec<Commit>,
}

impl PatchChain {
    pub fn new(source_file: impl Into<String>) -> Self {
        Self {
            source_file: source_file.into(),
            active_commit_index: 0,
            commits: Vec::new(),
        }
    }

    pub fn commit(&self, index: usize) -> Result<&Commit> {
        self.commits
            .get(index)
            .ok_or_else(|| Error::out_of_range("commit", index, self.commits.len()))
    }

    fn commit_mut(&mut self, index: usize) -> Result<&mut Commit> {
        let len = self.commits.len();
        self.commits
            .get_mut(index)
            .ok_or_else(|| Error::out_of_range("commit", index, len))
    }

    pub fn active_commit(&self) -> Result<&Commit> {
        self.commit(self.active_commit_index)
    }

    /// Snapshot text of `commits[index]`.
    pub fn commit_content(&self, index: usize) -> Result<&str> {
        Ok(&self.commit(index)?.content)
    }

    pub fn get_patched(&self, commit_index: usize, patch_index: usize) -> Result<String> {
        self.commit(commit_index)?.get_patched(patch_index)
    }

    /// Text the history says is currently on disk.
    pub fn current_content(&self) -> Result<String> {
        self.active_commit()?.current_content()
    }

    /// Pushes a new commit and makes it active. Returns its index.
    pub fn new_commit(&mut self, content: String, name: Option<String>, retention: Retention) -> usize {
        let name = name.unwrap_or_else(|| format!("Commit-{}", self.commits.len()));

        if retention.clear_on_new_commit {
            self.commits.iter_mut().for_each(Commit::clear_patches);
        }

        self.commits.push(Commit::new(name, content));
        self.active_commit_index = self.commits.len() - 1;
        self.active_commit_index
    }

    /// Records a save: `disk_data` is what was on disk when the save began,
    /// `new_data` what is being written.
    ///
    /// A file without commits gets its first commit. Otherwise the save is
    /// diffed against the last known state, unless the disk content shows an
    /// outside modification; that modification is then recorded as its own
    /// patch before the save is diffed against it.
    pub fn record_edit(
        &mut self,
        disk_data: &str,
        new_data: &str,
        retention: Retention,
    ) -> Result<EditOutcome> {
        if self.commits.is_empty() {
            let commit = self.new_commit(new_data.to_string(), None, retention);
            return Ok(EditOutcome::Committed { commit });
        }

        let commit_index = self.active_commit_index;
        let commit = self.commit_mut(commit_index)?;
        let last_known = commit.current_content()?;

        let old_data = if new_data != disk_data {
            if disk_data != last_known {
                commit.append_patch(Patch::between(&last_known, disk_data), retention)?;
            }
            disk_data
        } else {
            last_known.as_str()
        };

        if new_data == old_data {
            return Ok(EditOutcome::Unchanged);
        }

        commit.append_patch(Patch::between(old_data, new_data), retention)?;
        Ok(EditOutcome::Patched {
            commit: commit_index,
            patch: commit.active_patch_index,
        })
    }

    /// Makes `commits[index]` active at its snapshot (patch 0) and returns
    /// the text to write to disk. Later patches are kept until the next edit.
    pub fn restore_commit(&mut self, index: usize) -> Result<String> {
        let commit = self.commit_mut(index)?;
        let content = commit.content.clone();
        commit.active_patch_index = 0;
        self.active_commit_index = index;
        Ok(content)
    }

    /// Makes patch `index` of a commit active and returns the text to write
    /// to disk. `commit_index` defaults to the active commit; naming one
    /// also makes it the active commit.
    pub fn restore_patch(&mut self, index: usize, commit_index: Option<usize>) -> Result<String> {
        let target = commit_index.unwrap_or(self.active_commit_index);
        let commit = self.commit_mut(target)?;
        let content = commit.get_patched(index)?;
        commit.active_patch_index = index;

        if commit_index.is_some() {
            self.active_commit_index = target;
        }
        Ok(content)
    }

    pub fn delete_commit(&mut self, index: usize) -> Result<Commit> {
        if index == self.active_commit_index {
            return Err(Error::InvalidOperation(
                "Can't delete the active commit. Restore another commit first".to_string(),
            ));
        }
        self.commit(index)?;

        let removed = self.commits.remove(index);
        if index < self.active_commit_index {
            self.active_commit_index -= 1;
        }
        Ok(removed)
    }

    pub fn rename_commit(&mut self, index: usize, name: String) -> Result<()> {
        self.commit_mut(index)?.name = name;
        Ok(())
    }

    /// Checks the index invariants a decoded record has to satisfy.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.commits.is_empty() {
            return match self.active_commit_index {
                0 => Ok(()),
                active => Err(format!("active commit {active} set on an empty history")),
            };
        }
        if self.active_commit_index >= self.commits.len() {
            return Err(format!(
                "active commit {} out of range ({} commits)",
                self.active_commit_index,
                self.commits.len()
            ));
        }
        self.commits.iter().try_for_each(Commit::validate)
    }
}

/// Dates are stored as epoch milliseconds. Older records used RFC 3339 or
/// `M/D/YYYY, h:mm:ss AM` strings, which are still accepted on read.
pub(crate) mod epoch_millis {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(date.timestamp_millis())
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDate {
        Millis(i64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        match RawDate::deserialize(deserializer)? {
            RawDate::Millis(millis) => Utc
                .timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| de::Error::custom(format!("timestamp {millis} out of range"))),
            RawDate::Text(text) => {
                parse_text(&text).ok_or_else(|| de::Error::custom(format!("unrecognized date {text:?}")))
            }
        }
    }

    pub fn parse_text(text: &str) -> Option<DateTime<Utc>> {
        if let Ok(date) = DateTime::parse_from_rfc3339(text) {
            return Some(date.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(text, "%m/%d/%Y, %I:%M:%S %p")
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use similar_asserts::assert_eq;

    fn chain_with(contents: &[&str]) -> PatchChain {
        let mut chain = PatchChain::new("a.txt");
        for (i, content) in contents.iter().enumerate() {
            let disk = if i == 0 { "" } else { contents[i - 1] };
            chain
                .record_edit(disk, content, Retention::unbounded())
                .unwrap();
        }
        chain
    }

    #[test]
    fn test_first_save_creates_commit() {
        let mut chain = PatchChain::new("a.txt");
        let outcome = chain
            .record_edit("", "hello", Retention::unbounded())
            .unwrap();

        assert_eq!(outcome, EditOutcome::Committed { commit: 0 });
        assert_eq!(chain.commits.len(), 1);
        assert_eq!(chain.active_commit_index, 0);

        let commit = &chain.commits[0];
        assert_eq!(commit.name, "Commit-0");
        assert_eq!(commit.content, "hello");
        assert_eq!(commit.patches.len(), 1);
        assert_eq!(commit.patches[0].content, create_patch("", ""));
        assert_eq!(commit.active_patch_index, 0);
    }

    #[test]
    fn test_edit_appends_replayable_patch() {
        let chain = chain_with(&["hello", "hello world"]);
        let commit = &chain.commits[0];

        assert_eq!(commit.patches.len(), 2);
        assert_eq!(commit.active_patch_index, 1);
        assert_eq!(commit.get_patched(0).unwrap(), "hello");
        assert_eq!(commit.get_patched(1).unwrap(), "hello world");
    }

    #[test]
    fn test_replay_matches_every_recorded_state() {
        let states = [
            "fn main() {}\n",
            "fn main() {\n    println!(\"hi\");\n}\n",
            "fn main() {\n    println!(\"hi\");\n    println!(\"there\");\n}\n",
            "// header\nfn main() {\n    println!(\"there\");\n}\n",
            "",
            "rewritten",
        ];
        let chain = chain_with(&states);
        let commit = &chain.commits[0];

        assert_eq!(commit.patches.len(), states.len());
        for (i, state) in states.iter().enumerate() {
            assert_eq!(commit.get_patched(i).unwrap(), *state);
        }
    }

    #[test]
    fn test_unchanged_save_is_noop() {
        let mut chain = chain_with(&["hello", "hello world"]);
        let before = chain.clone();

        let outcome = chain
            .record_edit("hello world", "hello world", Retention::unbounded())
            .unwrap();

        assert_eq!(outcome, EditOutcome::Unchanged);
        assert_eq!(chain, before);
    }

    #[test]
    fn test_external_modification_is_its_own_step() {
        let mut chain = chain_with(&["a\n", "a\nb\n"]);

        // A formatter rewrote the file before the save landed.
        let outcome = chain
            .record_edit("A\nb\n", "A\nb\nc\n", Retention::unbounded())
            .unwrap();

        assert_eq!(outcome, EditOutcome::Patched { commit: 0, patch: 3 });
        let commit = &chain.commits[0];
        assert_eq!(commit.get_patched(2).unwrap(), "A\nb\n");
        assert_eq!(commit.get_patched(3).unwrap(), "A\nb\nc\n");
    }

    #[test]
    fn test_carriage_return_text_replays() {
        let mut chain = chain_with(&["line1\rline2\r"]);
        let outcome = chain
            .record_edit("line1\rline2\r", "line1\rline2 changed\r", Retention::unbounded())
            .unwrap();

        assert_eq!(outcome, EditOutcome::Patched { commit: 0, patch: 1 });
        assert_eq!(chain.get_patched(0, 1).unwrap(), "line1\rline2 changed\r");
        assert_eq!(
            chain
                .record_edit("line1\rline2 changed\r", "line1\rline2 changed\r", Retention::unbounded())
                .unwrap(),
            EditOutcome::Unchanged
        );
    }

    #[test]
    fn test_restore_commit_points_at_snapshot() {
        let mut chain = chain_with(&["hello", "hello world"]);
        chain.new_commit("other".to_string(), None, Retention::unbounded());

        let content = chain.restore_commit(0).unwrap();

        assert_eq!(content, "hello");
        assert_eq!(chain.active_commit_index, 0);
        assert_eq!(chain.commits[0].active_patch_index, 0);
        assert_eq!(chain.commits[0].patches.len(), 2);
        assert_eq!(chain.current_content().unwrap(), "hello");
        assert_eq!(
            chain
                .record_edit("hello", "hello", Retention::unbounded())
                .unwrap(),
            EditOutcome::Unchanged
        );
    }

    #[test]
    fn test_truncation_on_fork() {
        let mut chain = chain_with(&["s", "p1", "p2", "p3"]);
        let p1 = chain.commits[0].patches[1].clone();
        chain.restore_patch(1, None).unwrap();

        let mut commit = chain.commits[0].clone();
        let p4 = Patch::between("p1", "p4");
        commit.append_patch(p4.clone(), Retention::unbounded()).unwrap();

        assert_eq!(commit.patches.len(), 3);
        assert_eq!(commit.patches[1], p1);
        assert_eq!(commit.patches[2], p4);
        assert_eq!(commit.active_patch_index, 2);
        assert_eq!(commit.get_patched(2).unwrap(), "p4");
    }

    #[test]
    fn test_restore_then_edit_truncates_through_record() {
        let mut chain = chain_with(&["v0", "v1", "v2"]);
        let restored = chain.restore_patch(0, None).unwrap();
        assert_eq!(restored, "v0");

        chain
            .record_edit("v0", "v0 edited", Retention::unbounded())
            .unwrap();

        let commit = &chain.commits[0];
        assert_eq!(commit.patches.len(), 2);
        assert_eq!(commit.get_patched(1).unwrap(), "v0 edited");
    }

    #[test]
    fn test_retention_drops_oldest_non_sentinel() {
        let retention = Retention::with_max_patches(3);
        let mut chain = PatchChain::new("a.txt");
        let states = ["one\n", "two\n", "three\n", "four\n", "five\n"];
        for (i, state) in states.iter().enumerate() {
            let disk = if i == 0 { "" } else { states[i - 1] };
            chain.record_edit(disk, state, retention).unwrap();
        }

        let commit = &chain.commits[0];
        assert_eq!(commit.patches.len(), 3);
        assert_eq!(commit.patches[0].content, create_patch("", ""));
        assert_eq!(commit.active_patch_index, 2);
        assert_eq!(commit.get_patched(0).unwrap(), "one\n");
        assert_eq!(commit.get_patched(1).unwrap(), "four\n");
        assert_eq!(commit.get_patched(2).unwrap(), "five\n");
    }

    #[test]
    fn test_retention_keeps_newest_patch_dates() {
        let mut commit = Commit::new("c".to_string(), "0".to_string());
        let mut dates = Vec::new();
        let mut prev = "0".to_string();
        for i in 1..=4 {
            let next = i.to_string();
            let date = Utc.timestamp_millis_opt(1_000 * i).unwrap();
            dates.push(date);
            commit
                .append_patch(
                    Patch::between(&prev, &next).with_date(date),
                    Retention::with_max_patches(2),
                )
                .unwrap();
            prev = next;
        }

        assert_eq!(commit.patches.len(), 2);
        assert_eq!(commit.patches[1].date, dates[3]);
        assert_eq!(commit.get_patched(1).unwrap(), "4");
    }

    #[test]
    fn test_get_patched_rejects_out_of_range() {
        let chain = chain_with(&["a", "b"]);
        let err = chain.commits[0].get_patched(2).unwrap_err();
        assert!(matches!(
            err,
            Error::IndexOutOfRange {
                what: "patch",
                index: 2,
                len: 2
            }
        ));
    }

    #[test]
    fn test_get_patched_surfaces_corruption() {
        let mut chain = chain_with(&["a\nb\n", "a\nc\n"]);
        chain.commits[0].content = "something else\n".to_string();

        let err = chain.commits[0].get_patched(1).unwrap_err();
        assert!(matches!(err, Error::PatchApply { index: 1, .. }));
    }

    #[test]
    fn test_new_commit_clears_other_patches_when_configured() {
        let mut chain = chain_with(&["a", "b", "c"]);
        let retention = Retention {
            clear_on_new_commit: true,
            ..Retention::default()
        };

        let index = chain.new_commit("c".to_string(), Some("checkpoint".to_string()), retention);

        assert_eq!(index, 1);
        assert_eq!(chain.active_commit_index, 1);
        assert_eq!(chain.commits[0].patches.len(), 1);
        assert_eq!(chain.commits[0].active_patch_index, 0);
        assert_eq!(chain.commits[1].name, "checkpoint");
    }

    #[test]
    fn test_new_commit_default_name_and_patches_kept() {
        let mut chain = chain_with(&["a", "b"]);
        chain.new_commit("b".to_string(), None, Retention::unbounded());

        assert_eq!(chain.commits[1].name, "Commit-1");
        assert_eq!(chain.commits[0].patches.len(), 2);
    }

    #[test]
    fn test_delete_active_commit_rejected() {
        let mut chain = chain_with(&["a"]);
        chain.new_commit("b".to_string(), None, Retention::unbounded());
        let before = chain.clone();

        let err = chain.delete_commit(chain.active_commit_index).unwrap_err();

        assert!(matches!(err, Error::InvalidOperation(_)));
        assert_eq!(chain, before);
    }

    #[test]
    fn test_delete_before_active_shifts_index() {
        let mut chain = chain_with(&["a"]);
        chain.new_commit("b".to_string(), Some("second".to_string()), Retention::unbounded());
        chain.new_commit("c".to_string(), Some("third".to_string()), Retention::unbounded());
        chain.restore_commit(1).unwrap();

        let removed = chain.delete_commit(0).unwrap();

        assert_eq!(removed.content, "a");
        assert_eq!(chain.active_commit_index, 0);
        assert_eq!(chain.active_commit().unwrap().name, "second");
    }

    #[test]
    fn test_delete_after_active_keeps_index() {
        let mut chain = chain_with(&["a"]);
        chain.new_commit("b".to_string(), None, Retention::unbounded());
        chain.restore_commit(0).unwrap();

        chain.delete_commit(1).unwrap();
        assert_eq!(chain.active_commit_index, 0);
        assert!(chain.delete_commit(5).is_err());
    }

    #[test]
    fn test_restore_patch_in_other_commit_switches_active() {
        let mut chain = chain_with(&["a", "ab"]);
        chain.new_commit("x".to_string(), None, Retention::unbounded());

        let content = chain.restore_patch(1, Some(0)).unwrap();

        assert_eq!(content, "ab");
        assert_eq!(chain.active_commit_index, 0);
        assert_eq!(chain.commits[0].active_patch_index, 1);
        assert!(chain.restore_patch(3, Some(0)).is_err());
        assert!(chain.restore_commit(7).is_err());
    }

    #[test]
    fn test_rename_commit() {
        let mut chain = chain_with(&["a"]);
        chain.rename_commit(0, "initial".to_string()).unwrap();

        assert_eq!(chain.commits[0].name, "initial");
        assert!(chain.rename_commit(1, "nope".to_string()).is_err());
    }

    #[test]
    fn test_commit_content_ignores_patches() {
        let mut chain = chain_with(&["base", "base edited"]);
        chain.new_commit("second".to_string(), None, Retention::unbounded());

        assert_eq!(chain.commit_content(0).unwrap(), "base");
        assert_eq!(chain.commit_content(1).unwrap(), "second");
        assert!(matches!(
            chain.commit_content(2),
            Err(Error::IndexOutOfRange { what: "commit", index: 2, len: 2 })
        ));
    }

    #[test]
    fn test_validate_catches_bad_indices() {
        let mut chain = chain_with(&["a", "b"]);
        assert!(chain.validate().is_ok());

        chain.commits[0].active_patch_index = 9;
        assert!(chain.validate().is_err());

        chain.commits[0].active_patch_index = 0;
        chain.active_commit_index = 3;
        assert!(chain.validate().is_err());
    }

    #[test]
    fn test_serialized_shape() {
        let chain = chain_with(&["hello", "hello world"]);
        let value = serde_json::to_value(&chain).unwrap();

        assert_eq!(value["sourceFile"], "a.txt");
        assert_eq!(value["activeCommit"], 0);
        let commit = &value["commits"][0];
        assert_eq!(commit["content"], "hello");
        assert_eq!(commit["activePatchIndex"], 1);
        assert!(commit["date"].is_i64());
        assert!(commit["patches"][1]["date"].is_i64());

        let decoded: PatchChain = serde_json::from_value(value).unwrap();
        assert_eq!(decoded.commits[0].get_patched(1).unwrap(), "hello world");
    }

    #[test]
    fn test_dates_accept_older_string_formats() {
        let iso = epoch_millis::parse_text("2021-11-02T22:15:30.000Z").unwrap();
        let locale = epoch_millis::parse_text("11/02/2021, 10:15:30 PM").unwrap();

        assert_eq!(iso, locale);
        assert!(epoch_millis::parse_text("yesterday").is_none());
    }
}
