//! Final quest reports. Each quest type has its own report shape, so the
//! required-field contract is carried by the type system rather than a lookup
//! table. The transformer collaborator still answers with an all-optional
//! `RawTransform`; converting it into a `Report` records which required fields
//! were absent so the caller can log the violation and carry on with a
//! best-effort report.

use serde::{Deserialize, Serialize};

use crate::quest::QuestType;

/// Four-part guidance block produced for the narrative quest types.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DestinyGuide {
    pub daily: String,
    pub main: String,
    pub side: String,
    pub oracle: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bond {
    pub class_id: String,
    pub description: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DestinyBonds {
    pub compatible: Bond,
    pub conflicting: Bond,
}

/// Five-axis stat block for the bigfive quest, 0-100 per axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct TraitStats {
    pub o: u8,
    pub c: u8,
    pub e: u8,
    pub a: u8,
    pub n: u8,
}

/// The persisted outcome of a completed quest, tagged by quest type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "quest_type", rename_all = "lowercase")]
pub enum Report {
    Mbti {
        class_id: String,
        destiny_guide: DestinyGuide,
        destiny_bonds: DestinyBonds,
    },
    #[serde(rename = "bigfive")]
    BigFive { stats: TraitStats },
    Disc { stance_id: String },
    Enneagram {
        race_id: String,
        destiny_guide: DestinyGuide,
        destiny_bonds: DestinyBonds,
    },
    Gallup { talent_ids: Vec<String> },
}

impl Report {
    pub fn quest_type(&self) -> QuestType {
        match self {
            Self::Mbti { .. } => QuestType::Mbti,
            Self::BigFive { .. } => QuestType::BigFive,
            Self::Disc { .. } => QuestType::Disc,
            Self::Enneagram { .. } => QuestType::Enneagram,
            Self::Gallup { .. } => QuestType::Gallup,
        }
    }

    /// Class identifier, when this report assigns one. Drives the player's
    /// avatar update.
    pub fn hero_class_id(&self) -> Option<&str> {
        match self {
            Self::Mbti { class_id, .. } if !class_id.is_empty() => Some(class_id),
            _ => None,
        }
    }
}

/// Untyped transformer answer: every field optional, exactly as it arrives
/// from the collaborator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTransform {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub race_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<TraitStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub talent_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destiny_guide: Option<DestinyGuide>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destiny_bonds: Option<DestinyBonds>,
}

impl RawTransform {
    /// Build the typed report for `quest_type`, defaulting whatever the
    /// transformer failed to provide. Missing required field names are
    /// returned alongside so the violation can be logged; the report itself
    /// is still usable (availability over strict correctness).
    pub fn into_report(self, quest_type: QuestType) -> (Report, Vec<&'static str>) {
        let mut missing = Vec::new();

        fn take<T>(slot: Option<T>, name: &'static str, missing: &mut Vec<&'static str>) -> T
        where
            T: Default,
        {
            match slot {
                Some(value) => value,
                None => {
                    missing.push(name);
                    T::default()
                }
            }
        }

        let report = match quest_type {
            QuestType::Mbti => Report::Mbti {
                class_id: take(self.class_id, "class_id", &mut missing),
                destiny_guide: take(self.destiny_guide, "destiny_guide", &mut missing),
                destiny_bonds: take(self.destiny_bonds, "destiny_bonds", &mut missing),
            },
            QuestType::BigFive => Report::BigFive {
                stats: take(self.stats, "stats", &mut missing),
            },
            QuestType::Disc => Report::Disc {
                stance_id: take(self.stance_id, "stance_id", &mut missing),
            },
            QuestType::Enneagram => Report::Enneagram {
                race_id: take(self.race_id, "race_id", &mut missing),
                destiny_guide: take(self.destiny_guide, "destiny_guide", &mut missing),
                destiny_bonds: take(self.destiny_bonds, "destiny_bonds", &mut missing),
            },
            QuestType::Gallup => Report::Gallup {
                talent_ids: take(self.talent_ids, "talent_ids", &mut missing),
            },
        };

        (report, missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guide() -> DestinyGuide {
        DestinyGuide {
            daily: "d".into(),
            main: "m".into(),
            side: "s".into(),
            oracle: "o".into(),
        }
    }

    #[test]
    fn complete_mbti_transform_has_no_missing_fields() {
        let raw = RawTransform {
            class_id: Some("CLS_INTJ".into()),
            destiny_guide: Some(guide()),
            destiny_bonds: Some(DestinyBonds::default()),
            ..Default::default()
        };
        let (report, missing) = raw.into_report(QuestType::Mbti);
        assert!(missing.is_empty());
        assert_eq!(report.quest_type(), QuestType::Mbti);
        assert_eq!(report.hero_class_id(), Some("CLS_INTJ"));
    }

    #[test]
    fn missing_fields_are_reported_not_fatal() {
        let raw = RawTransform {
            class_id: Some("CLS_ENFP".into()),
            ..Default::default()
        };
        let (report, missing) = raw.into_report(QuestType::Mbti);
        assert_eq!(missing, vec!["destiny_guide", "destiny_bonds"]);
        // Best-effort report still carries what arrived.
        assert_eq!(report.hero_class_id(), Some("CLS_ENFP"));
    }

    #[test]
    fn bigfive_requires_stats_only() {
        let raw = RawTransform {
            stats: Some(TraitStats { o: 80, c: 70, e: 60, a: 90, n: 40 }),
            // Irrelevant extras are simply dropped.
            class_id: Some("CLS_INTP".into()),
            ..Default::default()
        };
        let (report, missing) = raw.into_report(QuestType::BigFive);
        assert!(missing.is_empty());
        assert_eq!(report.hero_class_id(), None);
        match report {
            Report::BigFive { stats } => assert_eq!(stats.a, 90),
            other => panic!("expected bigfive report, got {other:?}"),
        }
    }

    #[test]
    fn empty_transform_defaults_every_required_field() {
        let (report, missing) = RawTransform::default().into_report(QuestType::Enneagram);
        assert_eq!(missing, vec!["race_id", "destiny_guide", "destiny_bonds"]);
        match report {
            Report::Enneagram { race_id, .. } => assert!(race_id.is_empty()),
            other => panic!("expected enneagram report, got {other:?}"),
        }
    }

    #[test]
    fn gallup_talents() {
        let raw = RawTransform {
            talent_ids: Some(vec!["TAL_FOCUS".into(), "TAL_EMPATHY".into()]),
            ..Default::default()
        };
        let (report, missing) = raw.into_report(QuestType::Gallup);
        assert!(missing.is_empty());
        match report {
            Report::Gallup { talent_ids } => assert_eq!(talent_ids.len(), 2),
            other => panic!("expected gallup report, got {other:?}"),
        }
    }

    #[test]
    fn report_serializes_with_quest_type_tag() {
        let report = Report::Disc {
            stance_id: "STN_D".into(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["quest_type"], "disc");
        assert_eq!(json["stance_id"], "STN_D");
    }

    #[test]
    fn stats_serialize_uppercase() {
        let stats = TraitStats { o: 1, c: 2, e: 3, a: 4, n: 5 };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["O"], 1);
        assert_eq!(json["N"], 5);
    }

    #[test]
    fn report_serde_roundtrip() {
        let report = Report::Mbti {
            class_id: "CLS_ISTP".into(),
            destiny_guide: guide(),
            destiny_bonds: DestinyBonds {
                compatible: Bond {
                    class_id: "CLS_ESFJ".into(),
                    description: "steady ally".into(),
                },
                conflicting: Bond {
                    class_id: "CLS_ENFJ".into(),
                    description: "friction".into(),
                },
            },
        };
        let json = serde_json::to_string(&report).unwrap();
        let parsed: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn raw_transform_tolerates_partial_json() {
        let raw: RawTransform = serde_json::from_str(r#"{"stance_id": "STN_I"}"#).unwrap();
        assert_eq!(raw.stance_id.as_deref(), Some("STN_I"));
        assert!(raw.stats.is_none());
    }
}
