//! General MIDI patch and percussion names for diagnostics

use crate::error::{Error, Result};
use std::path::Path;

pub const NUM_PATCHES: usize = 128;
pub const NUM_DRUM_NOTES: usize = 128;

/// Display names for the 128 melodic programs and 128 percussion notes
#[derive(Debug, Clone)]
pub struct NameTables {
    patches: Vec<String>,
    drums: Vec<String>,
}

impl NameTables {
    /// Numbered placeholder names
    pub fn new() -> Self {
        Self {
            patches: (1..=NUM_PATCHES).map(|n| format!("Patch #{}", n)).collect(),
            drums: (0..NUM_DRUM_NOTES).map(|n| format!("Note #{}", n)).collect(),
        }
    }

    /// Load both name files; a missing file keeps the placeholder names
    pub fn load(patch_path: &Path, drum_path: &Path) -> Result<Self> {
        let mut tables = Self::new();
        match std::fs::read_to_string(patch_path) {
            Ok(text) => tables.apply_patch_names(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => tracing::warn!(
                "Unable to open file listing patch names ({}), instrument names will not be available",
                patch_path.display()
            ),
            Err(e) => return Err(e.into()),
        }
        match std::fs::read_to_string(drum_path) {
            Ok(text) => tables.apply_drum_names(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => tracing::warn!(
                "Unable to open file listing percussion note names ({}), percussion names will not be available",
                drum_path.display()
            ),
            Err(e) => return Err(e.into()),
        }
        Ok(tables)
    }

    /// Apply `N=Name` lines with N in 1..=128
    pub fn apply_patch_names(&mut self, text: &str) -> Result<()> {
        for (line_no, number, name) in parse_lines(text, "patch") {
            if !(1..=NUM_PATCHES).contains(&number) {
                return Err(Error::NameTable {
                    line: line_no,
                    message: format!("patch {} is outside 1-128", number),
                });
            }
            self.patches[number - 1] = format!("{} [{}]", name, number);
        }
        Ok(())
    }

    /// Apply `N=Name` lines with N in 0..=127
    pub fn apply_drum_names(&mut self, text: &str) -> Result<()> {
        for (line_no, number, name) in parse_lines(text, "drum") {
            if number >= NUM_DRUM_NOTES {
                return Err(Error::NameTable {
                    line: line_no,
                    message: format!("drum note {} is outside 0-127", number),
                });
            }
            self.drums[number] = format!("{} [{}]", name, number);
        }
        Ok(())
    }

    /// Name of a 0-based melodic program
    pub fn patch(&self, program: u8) -> &str {
        &self.patches[program as usize % NUM_PATCHES]
    }

    /// Name of a percussion note
    pub fn drum(&self, note: u8) -> &str {
        &self.drums[note as usize % NUM_DRUM_NOTES]
    }
}

impl Default for NameTables {
    fn default() -> Self {
        Self::new()
    }
}

/// Yield `(line number, N, name)` for each `N=Name` line, warning about junk
fn parse_lines<'a>(text: &'a str, kind: &'a str) -> impl Iterator<Item = (usize, usize, &'a str)> + 'a {
    text.lines().enumerate().filter_map(move |(i, raw)| {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            return None;
        }
        let parsed = line
            .split_once('=')
            .and_then(|(n, name)| n.trim().parse::<usize>().ok().map(|n| (n, name)));
        match parsed {
            Some((number, name)) => Some((i + 1, number, name)),
            None => {
                tracing::warn!("Invalid line {} in {} name table: {}", i + 1, kind, line);
                None
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_names() {
        let names = NameTables::new();
        assert_eq!(names.patch(0), "Patch #1");
        assert_eq!(names.patch(127), "Patch #128");
        assert_eq!(names.drum(36), "Note #36");
    }

    #[test]
    fn test_apply_names() {
        let mut names = NameTables::new();
        names
            .apply_patch_names("# General MIDI\n1=Acoustic Grand Piano\r\n\n30=Overdriven Guitar\nnonsense\n")
            .unwrap();
        names.apply_drum_names("36=Bass Drum 1\n").unwrap();
        assert_eq!(names.patch(0), "Acoustic Grand Piano [1]");
        assert_eq!(names.patch(29), "Overdriven Guitar [30]");
        assert_eq!(names.patch(1), "Patch #2");
        assert_eq!(names.drum(36), "Bass Drum 1 [36]");
    }

    #[test]
    fn test_indented_comments_are_skipped() {
        let lines: Vec<_> = parse_lines("  # 1=Commented Out\n\t#2=Also\n3=Kept\n", "patch").collect();
        assert_eq!(lines, vec![(3, 3, "Kept")]);
    }

    #[test]
    fn test_out_of_range_is_fatal() {
        let mut names = NameTables::new();
        assert!(matches!(
            names.apply_patch_names("1=Piano\n0=Nothing\n"),
            Err(Error::NameTable { line: 2, .. })
        ));
        assert!(matches!(
            names.apply_drum_names("128=Too High\n"),
            Err(Error::NameTable { line: 1, .. })
        ));
    }

    #[test]
    fn test_missing_files_keep_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let names = NameTables::load(&dir.path().join("patch.txt"), &dir.path().join("drum.txt")).unwrap();
        assert_eq!(names.patch(5), "Patch #6");
    }
}
