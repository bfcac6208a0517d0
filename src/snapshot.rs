//! Board export/import.
//! The snapshot is the only on-disk form of a board: pretty JSON, reproducible byte for byte.
//! A failed import never touches the board.

use crate::board::{Board, BoardError, Card, DEFAULT_TEAM1_HEADING, DEFAULT_TEAM2_HEADING, Section};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

fn default_team1() -> String {
    DEFAULT_TEAM1_HEADING.to_string()
}

fn default_team2() -> String {
    DEFAULT_TEAM2_HEADING.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_team1")]
    pub team1_name: String,
    #[serde(default = "default_team2")]
    pub team2_name: String,
    #[serde(default)]
    pub officials: Vec<Card>,
    #[serde(default)]
    pub team1: Vec<Card>,
    #[serde(default)]
    pub team2: Vec<Card>,
    #[serde(default)]
    pub unassigned: Vec<Card>,
}

impl BoardSnapshot {
    pub fn capture(board: &Board, title: &str) -> Self {
        BoardSnapshot {
            title: title.to_string(),
            team1_name: board.team1_heading().to_string(),
            team2_name: board.team2_heading().to_string(),
            officials: board.section(Section::Officials).to_vec(),
            team1: board.section(Section::Team1).to_vec(),
            team2: board.section(Section::Team2).to_vec(),
            unassigned: board.section(Section::Unassigned).to_vec(),
        }
    }

    pub fn to_json(&self) -> Result<String, BoardError> {
        serde_json::to_string_pretty(self).map_err(BoardError::Export)
    }

    pub fn from_json(json: &str) -> Result<Self, BoardError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Consumes the snapshot into `board`, replacing all four sections and both headings.
    pub fn restore_into(self, board: &mut Board) {
        board.replace(
            [self.officials, self.team1, self.team2, self.unassigned],
            self.team1_name,
            self.team2_name,
        );
    }
}

pub fn export_board(board: &Board, title: &str) -> Result<String, BoardError> {
    BoardSnapshot::capture(board, title).to_json()
}

/// Parses first, then replaces; on malformed input the board is left as it was.
pub fn import_board(board: &mut Board, json: &str) -> Result<BoardSnapshot, BoardError> {
    let snapshot = BoardSnapshot::from_json(json)?;
    snapshot.clone().restore_into(board);
    info!(
        cards = board.card_count(),
        team1 = %board.team1_heading(),
        team2 = %board.team2_heading(),
        "board imported"
    );
    Ok(snapshot)
}

pub fn load_board(path: &Path) -> Result<Board> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read board file: {}", path.display()))?;
    let mut board = Board::default();
    import_board(&mut board, &json).map_err(|e| anyhow::anyhow!(e.user_message()))?;
    Ok(board)
}

pub fn save_board(board: &Board, title: &str, path: &Path) -> Result<()> {
    let json = export_board(board, title)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write board file: {}", path.display()))?;
    Ok(())
}

/// Writes the export into `dir` under the title-derived filename and returns its path.
pub fn export_to_dir(board: &Board, title: &str, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export directory: {}", dir.display()))?;
    let path = dir.join(crate::title::export_filename(title));
    save_board(board, title, &path)?;
    info!(path = %path.display(), "board exported");
    Ok(path)
}

/// Reads a participants list (JSON array of cards) for `board init`.
pub fn load_participants(path: &Path) -> Result<Vec<Card>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read participants file: {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Participants file is not a JSON array of cards: {}", path.display()))
}
