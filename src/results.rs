//! Scan results as returned by the upload endpoint, and their text rendering.

use crate::board::{Board, Card, Section, value_text};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const NOT_AVAILABLE: &str = "N/A";

/// Flat extraction record. Numbers are accepted where the model returns them unquoted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    #[serde(default, deserialize_with = "lenient_string")]
    pub nom: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub prenom: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub licence: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub annee_validite: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub classement: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    pub doc_type: Option<String>,
}

impl ScanResult {
    /// Turns an extraction into a roster card. The licence number doubles as id when present.
    pub fn to_card(&self, fallback_id: &str, image_uri: Option<String>) -> Card {
        let field = |f: &Option<String>| f.clone().unwrap_or_default();
        Card {
            id: self.licence.clone().unwrap_or_else(|| fallback_id.to_string()),
            nom: field(&self.nom),
            prenom: field(&self.prenom),
            classement: field(&self.classement),
            licence: field(&self.licence),
            annee_validite: field(&self.annee_validite),
            club: String::new(),
            statut: field(&self.doc_type),
            id_checked: false,
            image_uri,
        }
    }
}

/// Files an extraction on `board` as an unassigned card and returns its id, section,
/// and whether it was already there. A known licence refreshes that card where it
/// stands; without a licence the card gets an unused id derived from `fallback_base`.
pub fn add_scanned_card(
    board: &mut Board,
    result: &ScanResult,
    fallback_base: &str,
    image_uri: Option<String>,
) -> (String, Section, bool) {
    let fallback_id = board.fresh_id(fallback_base);
    let card = result.to_card(&fallback_id, image_uri);
    let id = card.id.clone();
    let (section, existed) = board.upsert(Section::Unassigned, card);
    (id, section, existed)
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(value_text(Value::deserialize(deserializer)?).filter(|s| !s.trim().is_empty()))
}

/// What a successful (2xx, no `error`) upload produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Extracted { result: ScanResult, raw: Value },
    /// Acknowledgment-only deployments store the file and extract later.
    Uploaded { file: String },
    Unexpected { raw: Value },
}

impl ScanOutcome {
    pub fn extracted(&self) -> Option<&ScanResult> {
        match self {
            ScanOutcome::Extracted { result, .. } => Some(result),
            _ => None,
        }
    }
}

fn or_na(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or(NOT_AVAILABLE)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn render_outcome(outcome: &ScanOutcome) -> String {
    match outcome {
        ScanOutcome::Extracted { result, raw } => {
            let mut out = String::from("Résultats de l'extraction\n");
            if let Some(doc_type) = &result.doc_type {
                out.push_str(&format!("Type: {}\n", capitalize(doc_type)));
            }
            out.push_str(&format!("Nom: {} {}\n", or_na(&result.prenom), or_na(&result.nom)));
            out.push_str(&format!("Licence: {}\n", or_na(&result.licence)));
            out.push_str(&format!("Validité: {}\n", or_na(&result.annee_validite)));
            out.push_str(&format!("Classement: {}\n", or_na(&result.classement)));
            out.push_str("\nRaw JSON:\n");
            out.push_str(&serde_json::to_string_pretty(raw).unwrap_or_else(|_| raw.to_string()));
            out
        }
        ScanOutcome::Uploaded { file } => format!(
            "Scan terminé\nLe fichier a été téléversé avec succès :\n{}\nLe traitement OCR est en cours...",
            file
        ),
        ScanOutcome::Unexpected { .. } => "Réponse inattendue du serveur.".to_string(),
    }
}
