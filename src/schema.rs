//! Entity types and the unified logical-field registry.
//!
//! Every entity's schema lives here: the canonical field names documents
//! carry, the alias spellings those fields may have in source CSV headers
//! (Korean spellings first, matching the upstream data sets, then English
//! variants), and the per-entity allow-list that `--strict` enforces.
//! A single registry keeps alias tables from drifting apart between
//! entity loaders.
//!
//! Alias matching is normalization-insensitive (see
//! [`normalize_key`](crate::normalize::normalize_key)); order within an
//! alias list is priority order: the first alias that resolves against a
//! file's header wins.

use anyhow::{bail, Result};

/// A logical schema slot: canonical name plus acceptable source spellings.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Canonical field name used in documents.
    pub name: &'static str,
    /// Acceptable header spellings, in priority order.
    pub aliases: &'static [&'static str],
}

/// The entity kinds this engine reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Allergen,
    SymptomWeight,
    RiskRule,
    UserSeed,
    UserReport,
}

/// Explicit document-id column, recognized for every entity and
/// preferred over any derived key.
pub const ID_FIELD: FieldSpec = FieldSpec {
    name: "id",
    aliases: &["문서ID", "아이디", "ID", "id"],
};

const ALLERGEN_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "display_name",
        aliases: &["표준명", "표시명", "이름", "명칭", "항목", "품목", "표준", "displayName", "name"],
    },
    FieldSpec {
        name: "synonyms",
        aliases: &["동의어", "유의어", "키워드", "동의어리스트", "동의어목록", "synonyms"],
    },
    FieldSpec {
        name: "category",
        aliases: &["대표군", "분류", "카테고리", "군", "그룹", "category"],
    },
    FieldSpec {
        name: "symptom",
        aliases: &["증상", "관련증상", "주증상", "증상구분"],
    },
    FieldSpec {
        name: "conservative_score",
        aliases: &["보수적점수", "보수점수", "보수적 점수", "보수 점수", "보수평가점수"],
    },
    FieldSpec {
        name: "is_major",
        aliases: &["주요알레르겐", "주요", "메이저", "중요", "isMajorAllergen"],
    },
];

const SYMPTOM_WEIGHT_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "name",
        aliases: &["증상계통", "표시명", "이름", "displayName", "name"],
    },
    FieldSpec {
        name: "symptoms",
        aliases: &["대표증상", "증상목록", "증상_목록", "증상", "symptoms"],
    },
    FieldSpec {
        name: "base_score",
        aliases: &["기본점수", "가중치", "점수", "weight"],
    },
    FieldSpec {
        name: "rule_note",
        aliases: &["보수규칙"],
    },
    FieldSpec {
        name: "note",
        aliases: &["비고"],
    },
];

const RISK_RULE_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "severity",
        aliases: &["위험도", "중증도", "severity"],
    },
    FieldSpec {
        name: "rule_kind",
        aliases: &["구분", "kind"],
    },
    FieldSpec {
        name: "keyword_pattern",
        aliases: &["한글 키워드(정규식)", "키워드", "패턴", "pattern"],
    },
];

const USER_SEED_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "nickname",
        aliases: &["닉네임", "별명", "nickname", "name"],
    },
    FieldSpec {
        name: "allergens",
        aliases: &["알레르겐", "알레르겐목록", "allergens"],
    },
];

const USER_REPORT_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "uid",
        aliases: &["사용자UID", "UID", "uid", "userId", "user_id"],
    },
    FieldSpec {
        name: "food",
        aliases: &["음식명", "음식", "foodName"],
    },
    FieldSpec {
        name: "allergens_detected",
        aliases: &["알레르겐_탐지", "탐지된_알레르겐", "알레르겐", "allergensDetected"],
    },
    FieldSpec {
        name: "symptoms_checked",
        aliases: &["증상_체크", "증상체크", "증상", "symptomsChecked"],
    },
    FieldSpec {
        name: "total_score",
        aliases: &["총점", "점수", "totalScore"],
    },
    FieldSpec {
        name: "final_severity",
        aliases: &["최종위험도", "위험도", "finalSeverity"],
    },
];

impl EntityType {
    /// All entity types, base collections first.
    pub fn all() -> [EntityType; 5] {
        [
            EntityType::Allergen,
            EntityType::SymptomWeight,
            EntityType::RiskRule,
            EntityType::UserSeed,
            EntityType::UserReport,
        ]
    }

    /// The three always-synced base collections (user data is opt-in).
    pub fn base() -> [EntityType; 3] {
        [
            EntityType::Allergen,
            EntityType::SymptomWeight,
            EntityType::RiskRule,
        ]
    }

    pub fn parse(s: &str) -> Result<EntityType> {
        Ok(match s {
            "allergens" => EntityType::Allergen,
            "symptom-weights" => EntityType::SymptomWeight,
            "risk-rules" => EntityType::RiskRule,
            "user-seeds" => EntityType::UserSeed,
            "user-reports" => EntityType::UserReport,
            other => bail!(
                "Unknown entity: '{}'. Available: allergens, symptom-weights, risk-rules, user-seeds, user-reports",
                other
            ),
        })
    }

    /// CLI spelling of this entity.
    pub fn slug(&self) -> &'static str {
        match self {
            EntityType::Allergen => "allergens",
            EntityType::SymptomWeight => "symptom-weights",
            EntityType::RiskRule => "risk-rules",
            EntityType::UserSeed => "user-seeds",
            EntityType::UserReport => "user-reports",
        }
    }

    /// Target store collection.
    pub fn collection(&self) -> &'static str {
        match self {
            EntityType::Allergen => "allergens",
            EntityType::SymptomWeight => "symptom_weights",
            EntityType::RiskRule => "risk_rules",
            EntityType::UserSeed => "user_seeds",
            EntityType::UserReport => "user_reports",
        }
    }

    /// Default CSV file name under the configured csv directory.
    pub fn default_csv_file(&self) -> &'static str {
        match self {
            EntityType::Allergen => "allergens.csv",
            EntityType::SymptomWeight => "symptom_weights.csv",
            EntityType::RiskRule => "risk_rules.csv",
            EntityType::UserSeed => "user_seeds.csv",
            EntityType::UserReport => "user_reports.csv",
        }
    }

    /// Logical fields this entity reads from source rows (the explicit id
    /// column is handled separately via [`ID_FIELD`]).
    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            EntityType::Allergen => ALLERGEN_FIELDS,
            EntityType::SymptomWeight => SYMPTOM_WEIGHT_FIELDS,
            EntityType::RiskRule => RISK_RULE_FIELDS,
            EntityType::UserSeed => USER_SEED_FIELDS,
            EntityType::UserReport => USER_REPORT_FIELDS,
        }
    }

    /// Document fields allowed to exist under `--strict`; anything else
    /// is stripped from stored documents.
    pub fn allowed_fields(&self) -> &'static [&'static str] {
        match self {
            EntityType::Allergen => &[
                "display_name",
                "name",
                "category",
                "symptom",
                "conservative_score",
                "synonyms",
                "is_major",
                "updated_at",
            ],
            EntityType::SymptomWeight => &[
                "name",
                "symptoms",
                "base_score",
                "rule_note",
                "note",
                "updated_at",
            ],
            EntityType::RiskRule => &["severity", "conditions", "updated_at"],
            EntityType::UserSeed => &["nickname", "allergens", "created_at", "updated_at"],
            EntityType::UserReport => &[
                "uid",
                "food",
                "allergens_detected",
                "symptoms_checked",
                "total_score",
                "final_severity",
                "created_at",
                "updated_at",
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_slugs() {
        for entity in EntityType::all() {
            assert_eq!(EntityType::parse(entity.slug()).unwrap(), entity);
        }
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(EntityType::parse("recipes").is_err());
    }

    #[test]
    fn test_allow_lists_cover_projected_fields() {
        // Every canonical field an entity projects must be allowed under
        // --strict, or a strict run would strip its own writes.
        for entity in EntityType::all() {
            let allowed = entity.allowed_fields();
            for spec in entity.fields() {
                // Row-level risk-rule fields fold into the nested
                // `conditions` map rather than appearing top-level.
                if entity == EntityType::RiskRule && spec.name != "severity" {
                    continue;
                }
                assert!(
                    allowed.contains(&spec.name),
                    "{:?} projects '{}' but does not allow it",
                    entity,
                    spec.name
                );
            }
        }
    }
}
