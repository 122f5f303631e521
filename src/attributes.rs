use std::fmt;
use std::str::FromStr;

use crate::errors::WorkflowError;

/// Declares a closed set of user-facing choices with their exact labels.
/// Parsing is case-insensitive; anything outside the set is a
/// configuration error.
macro_rules! closed_choice {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal, default = $default:ident {
            $($variant:ident => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $name {
            type Err = WorkflowError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let wanted = value.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|choice| choice.label().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| {
                        let known = $name::ALL
                            .iter()
                            .map(|choice| choice.label())
                            .collect::<Vec<_>>()
                            .join(", ");
                        WorkflowError::Configuration(format!(
                            "Unknown {} '{}'. Expected one of: {}",
                            $kind, wanted, known
                        ))
                    })
            }
        }
    };
}

closed_choice! {
    AgeRange, "age range", default = Any {
        Any => "Any",
        From18To25 => "18-25",
        From26To35 => "26-35",
        From36To50 => "36-50",
        From51To65 => "51-65",
        Over65 => "65+",
    }
}

closed_choice! {
    Gender, "gender", default = Any {
        Any => "Any",
        Woman => "Woman",
        Man => "Man",
        NonBinary => "Non-binary",
    }
}

closed_choice! {
    Ethnicity, "ethnicity", default = Any {
        Any => "Any",
        Asian => "Asian",
        Black => "Black",
        Caucasian => "Caucasian",
        Hispanic => "Hispanic",
        MiddleEastern => "Middle Eastern",
        Mixed => "Mixed",
    }
}

closed_choice! {
    HairColor, "hair color", default = Any {
        Any => "Any",
        Black => "Black",
        Brown => "Brown",
        Blonde => "Blonde",
        Red => "Red",
        Gray => "Gray",
        Other => "Other",
    }
}

closed_choice! {
    Expression, "expression", default = Neutral {
        Neutral => "Neutral",
        Smiling => "Smiling",
        Happy => "Happy",
        Excited => "Excited",
        Cute => "Cute",
        Surprised => "Surprised",
        Thoughtful => "Thoughtful",
        Confused => "Confused",
        Sad => "Sad",
        Angry => "Angry",
    }
}

closed_choice! {
    /// Artistic direction for the lifestyle scene.
    SceneStyle, "style", default = Default {
        Default => "Default",
        WithAPet => "With a Pet",
        WithFood => "With Food",
        Playful => "Playful",
        Mysterious => "Mysterious",
        Charming => "Charming",
        Relaxed => "Relaxed",
        Emotional => "Emotional",
    }
}

/// Structured description of the face to synthesize. Every enum field
/// defaults to `Any`, meaning unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaceAttributes {
    pub free_text: String,
    pub age_range: AgeRange,
    pub gender: Gender,
    pub ethnicity: Ethnicity,
    pub hair_color: HairColor,
}

impl FaceAttributes {
    /// True when nothing constrains the face: blank free text and every
    /// enum left at `Any`.
    pub fn is_unconstrained(&self) -> bool {
        self.free_text.trim().is_empty()
            && self.age_range == AgeRange::Any
            && self.gender == Gender::Any
            && self.ethnicity == Ethnicity::Any
            && self.hair_color == HairColor::Any
    }
}

/// The scene draft the user is composing. Only lives in the session as a
/// form; a compositing call consumes a sanitized copy of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneRequest {
    pub raw_prompt: String,
    pub expression: Expression,
    pub style: SceneStyle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_labels_case_insensitively() {
        assert_eq!("with a pet".parse::<SceneStyle>().unwrap(), SceneStyle::WithAPet);
        assert_eq!(" 65+ ".parse::<AgeRange>().unwrap(), AgeRange::Over65);
        assert_eq!("middle eastern".parse::<Ethnicity>().unwrap(), Ethnicity::MiddleEastern);
        assert_eq!("NON-BINARY".parse::<Gender>().unwrap(), Gender::NonBinary);
    }

    #[test]
    fn unknown_label_is_a_configuration_error() {
        let err = "Noir".parse::<SceneStyle>().unwrap_err();
        assert!(matches!(err, WorkflowError::Configuration(_)));
        assert!(err.to_string().contains("With a Pet"));
    }

    #[test]
    fn defaults_are_the_unconstrained_sentinels() {
        let attrs = FaceAttributes::default();
        assert!(attrs.is_unconstrained());
        assert_eq!(SceneRequest::default().expression, Expression::Neutral);
        assert_eq!(SceneRequest::default().style, SceneStyle::Default);
    }

    #[test]
    fn any_single_constraint_makes_attributes_usable() {
        let attrs = FaceAttributes {
            hair_color: HairColor::Red,
            ..FaceAttributes::default()
        };
        assert!(!attrs.is_unconstrained());

        let attrs = FaceAttributes {
            free_text: "   ".to_string(),
            ..FaceAttributes::default()
        };
        assert!(attrs.is_unconstrained());
    }

    #[test]
    fn labels_round_trip_through_display() {
        for style in SceneStyle::ALL {
            assert_eq!(style.to_string().parse::<SceneStyle>().unwrap(), *style);
        }
        assert_eq!(Expression::ALL.len(), 10);
    }
}
