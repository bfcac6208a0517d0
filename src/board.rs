//! Roster board module.
//! Four ordered sections (officials, team1, team2, unassigned) sharing one drop group.
//! Cards are typed records; a drop only changes section membership and position.
//! First card dropped into an empty team section names that team after its club.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_TEAM1_HEADING: &str = "Équipe 1";
pub const DEFAULT_TEAM2_HEADING: &str = "Équipe 2";

/// A participant record, rendered as one draggable unit.
/// Missing or null fields deserialize to empty strings / `false` / `None`;
/// numbers are kept as their text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Card {
    #[serde(deserialize_with = "lenient_text")]
    pub id: String,
    #[serde(deserialize_with = "lenient_text")]
    pub nom: String,
    #[serde(deserialize_with = "lenient_text")]
    pub prenom: String,
    #[serde(deserialize_with = "lenient_text")]
    pub classement: String,
    #[serde(deserialize_with = "lenient_text")]
    pub licence: String,
    #[serde(deserialize_with = "lenient_text")]
    pub annee_validite: String,
    #[serde(deserialize_with = "lenient_text")]
    pub club: String,
    #[serde(deserialize_with = "lenient_text")]
    pub statut: String,
    #[serde(deserialize_with = "lenient_flag")]
    pub id_checked: bool,
    #[serde(deserialize_with = "lenient_optional_text")]
    pub image_uri: Option<String>,
}

/// Text of a loosely typed JSON value. Null is absent; numbers and booleans keep their JSON text.
pub(crate) fn value_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(value_text(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn lenient_optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(value_text(Value::deserialize(deserializer)?).filter(|s| !s.is_empty()))
}

fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(s.trim(), "true" | "1"),
        _ => false,
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Section {
    Officials,
    Team1,
    Team2,
    Unassigned,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Officials,
        Section::Team1,
        Section::Team2,
        Section::Unassigned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Officials => "officials",
            Section::Team1 => "team1",
            Section::Team2 => "team2",
            Section::Unassigned => "unassigned",
        }
    }

    pub fn is_team(&self) -> bool {
        matches!(self, Section::Team1 | Section::Team2)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Section::ALL
            .into_iter()
            .find(|section| section.as_str() == s)
            .ok_or_else(|| BoardError::UnknownSection(s.to_string()))
    }
}

#[derive(Error, Debug)]
pub enum BoardError {
    #[error("Unknown card: {0}")]
    UnknownCard(String),

    #[error("Unknown section: {0}")]
    UnknownSection(String),

    #[error("Only team sections carry a heading, got {0}")]
    NotATeam(Section),

    #[error("Malformed board file: {0}")]
    MalformedImport(#[from] serde_json::Error),

    #[error("Failed to serialize board: {0}")]
    Export(#[source] serde_json::Error),
}

impl BoardError {
    /// Message shown to the user as a blocking alert.
    pub fn user_message(&self) -> String {
        match self {
            BoardError::MalformedImport(e) => {
                format!("Le fichier importé n'est pas un JSON valide : {}", e)
            }
            other => other.to_string(),
        }
    }
}

/// Inputs the board reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    /// A card was dropped into `to`; `index` is clamped, `None` appends.
    CardDropped {
        card_id: String,
        to: Section,
        index: Option<usize>,
    },
    HeadingEdited { section: Section, text: String },
}

/// Side effects of a handled event. A heading change means the title must be recomputed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardChange {
    pub moved_from: Option<Section>,
    pub heading_changed: Option<Section>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    officials: Vec<Card>,
    team1: Vec<Card>,
    team2: Vec<Card>,
    unassigned: Vec<Card>,
    team1_heading: String,
    team2_heading: String,
}

impl Default for Board {
    fn default() -> Self {
        Board::new(DEFAULT_TEAM1_HEADING, DEFAULT_TEAM2_HEADING)
    }
}

impl Board {
    pub fn new(team1_heading: &str, team2_heading: &str) -> Self {
        Board {
            officials: Vec::new(),
            team1: Vec::new(),
            team2: Vec::new(),
            unassigned: Vec::new(),
            team1_heading: team1_heading.to_string(),
            team2_heading: team2_heading.to_string(),
        }
    }

    /// Server-side population: every participant starts unassigned.
    pub fn with_participants(team1_heading: &str, team2_heading: &str, participants: Vec<Card>) -> Self {
        let mut board = Board::new(team1_heading, team2_heading);
        board.unassigned = participants;
        board
    }

    pub fn section(&self, section: Section) -> &[Card] {
        match section {
            Section::Officials => &self.officials,
            Section::Team1 => &self.team1,
            Section::Team2 => &self.team2,
            Section::Unassigned => &self.unassigned,
        }
    }

    fn section_mut(&mut self, section: Section) -> &mut Vec<Card> {
        match section {
            Section::Officials => &mut self.officials,
            Section::Team1 => &mut self.team1,
            Section::Team2 => &mut self.team2,
            Section::Unassigned => &mut self.unassigned,
        }
    }

    pub fn team1_heading(&self) -> &str {
        &self.team1_heading
    }

    pub fn team2_heading(&self) -> &str {
        &self.team2_heading
    }

    pub fn heading(&self, section: Section) -> Option<&str> {
        match section {
            Section::Team1 => Some(&self.team1_heading),
            Section::Team2 => Some(&self.team2_heading),
            _ => None,
        }
    }

    pub fn card_count(&self) -> usize {
        Section::ALL.iter().map(|s| self.section(*s).len()).sum()
    }

    /// Returns the section currently holding `card_id` and its position there.
    pub fn locate(&self, card_id: &str) -> Option<(Section, usize)> {
        Section::ALL.into_iter().find_map(|section| {
            self.section(section)
                .iter()
                .position(|card| card.id == card_id)
                .map(|idx| (section, idx))
        })
    }

    pub fn push(&mut self, section: Section, card: Card) {
        self.section_mut(section).push(card);
    }

    /// Adds `card` to `section`, or refreshes the card already carrying its id in place.
    /// A refresh keeps the existing club when the new card has none, and never unchecks the id.
    /// Returns where the card now sits and whether it was already on the board.
    pub fn upsert(&mut self, section: Section, mut card: Card) -> (Section, bool) {
        match self.locate(&card.id) {
            Some((at, idx)) => {
                let slot = &mut self.section_mut(at)[idx];
                if card.club.trim().is_empty() {
                    card.club = std::mem::take(&mut slot.club);
                }
                card.id_checked |= slot.id_checked;
                debug!(card_id = %card.id, section = %at, "card refreshed");
                *slot = card;
                (at, true)
            }
            None => {
                self.push(section, card);
                (section, false)
            }
        }
    }

    /// `base`, or `base-2`, `base-3`... whichever no card uses yet.
    pub fn fresh_id(&self, base: &str) -> String {
        if self.locate(base).is_none() {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{}-{}", base, n))
            .find(|id| self.locate(id).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    pub fn apply(&mut self, event: BoardEvent) -> Result<BoardChange, BoardError> {
        match event {
            BoardEvent::CardDropped { card_id, to, index } => self.drop_card(&card_id, to, index),
            BoardEvent::HeadingEdited { section, text } => {
                self.set_heading(section, &text)?;
                Ok(BoardChange {
                    moved_from: None,
                    heading_changed: Some(section),
                })
            }
        }
    }

    pub fn drop_card(
        &mut self,
        card_id: &str,
        to: Section,
        index: Option<usize>,
    ) -> Result<BoardChange, BoardError> {
        let (from, from_idx) = self
            .locate(card_id)
            .ok_or_else(|| BoardError::UnknownCard(card_id.to_string()))?;

        let card = self.section_mut(from).remove(from_idx);
        let target = self.section_mut(to);
        let was_empty = target.is_empty();
        let insert_at = index.map_or(target.len(), |i| i.min(target.len()));
        target.insert(insert_at, card);
        debug!(card_id, %from, %to, insert_at, "card dropped");

        let mut change = BoardChange {
            moved_from: Some(from),
            heading_changed: None,
        };

        // Only cross-section adds count; reordering inside a team is not an "add".
        if to.is_team() && from != to && was_empty {
            let club = self.section(to)[insert_at].club.trim().to_string();
            if !club.is_empty() {
                info!(%to, club = %club, "team named after first card's club");
                self.set_heading(to, &club)?;
                change.heading_changed = Some(to);
            }
        }

        Ok(change)
    }

    pub fn set_heading(&mut self, section: Section, text: &str) -> Result<(), BoardError> {
        match section {
            Section::Team1 => self.team1_heading = text.to_string(),
            Section::Team2 => self.team2_heading = text.to_string(),
            other => return Err(BoardError::NotATeam(other)),
        }
        Ok(())
    }

    /// Replaces every section and both headings at once.
    pub(crate) fn replace(
        &mut self,
        sections: [Vec<Card>; 4],
        team1_heading: String,
        team2_heading: String,
    ) {
        let [officials, team1, team2, unassigned] = sections;
        self.officials = officials;
        self.team1 = team1;
        self.team2 = team2;
        self.unassigned = unassigned;
        self.team1_heading = team1_heading;
        self.team2_heading = team2_heading;
    }

    /// Plain-text listing used by `board show`.
    pub fn render(&self, title: &str) -> String {
        let mut out = format!("{}\n", title);
        for section in Section::ALL {
            let label = self.heading(section).unwrap_or(match section {
                Section::Officials => "Officiels",
                _ => "Non assignés",
            });
            out.push_str(&format!("\n## {} [{}]\n", label, section));
            for card in self.section(section) {
                let check = if card.id_checked { "x" } else { " " };
                out.push_str(&format!(
                    "  [{}] {} {} {} ({}) licence {} / {} - {}\n",
                    check,
                    card.id,
                    card.prenom,
                    card.nom,
                    card.classement,
                    card.licence,
                    card.annee_validite,
                    card.club
                ));
            }
        }
        out
    }
}
