use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{ConfigField, Service, SocialField, SubmenuField};

pub(super) type Draft = BTreeMap<String, String>;

const DRAFT_NAME: &str = "name";
const DRAFT_EMOJI: &str = "emoji";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "input", rename_all = "snake_case")]
pub(super) enum PendingInput {
    WelcomeMessage,
    WelcomePhoto,
    MiniAppUrl,
    MiniAppText,
    ServiceText { service: Service },
    ServicePhoto { service: Service },
    SocialName,
    SocialEmoji,
    SocialUrl,
    SocialField { id: i64, field: SocialField },
    SubmenuName { service: Service },
    SubmenuText { service: Service },
    SubmenuField { id: i64, field: SubmenuField },
    AdminId,
    Broadcast,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum InputKind {
    Text,
    Photo,
}

impl PendingInput {
    pub(super) fn expects(&self) -> InputKind {
        match self {
            PendingInput::WelcomePhoto
            | PendingInput::ServicePhoto { .. }
            | PendingInput::SubmenuField {
                field: SubmenuField::Image,
                ..
            } => InputKind::Photo,
            _ => InputKind::Text,
        }
    }

    /// Inputs shown back to users as message bodies keep the sender's
    /// formatting; names, labels and links are stored as typed.
    pub(super) fn takes_formatting(&self) -> bool {
        matches!(
            self,
            PendingInput::WelcomeMessage
                | PendingInput::ServiceText { .. }
                | PendingInput::SubmenuText { .. }
                | PendingInput::SubmenuField {
                    field: SubmenuField::Text,
                    ..
                }
                | PendingInput::Broadcast
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Input<'a> {
    Text(&'a str),
    Photo(&'a str),
}

impl<'a> Input<'a> {
    pub(super) fn kind(&self) -> InputKind {
        match self {
            Input::Text(_) => InputKind::Text,
            Input::Photo(_) => InputKind::Photo,
        }
    }

    pub(super) fn value(&self) -> &'a str {
        match self {
            Input::Text(value) | Input::Photo(value) => value,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub(super) struct UserState {
    pub(super) pending: Option<PendingInput>,
    #[serde(default)]
    pub(super) draft: Draft,
    pub(super) last_message_id: Option<i32>,
}

impl UserState {
    pub(super) fn begin(&mut self, pending: PendingInput) {
        self.pending = Some(pending);
        self.draft.clear();
    }

    pub(super) fn clear_pending(&mut self) {
        self.pending = None;
        self.draft.clear();
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) enum Commit {
    Config {
        field: ConfigField,
        value: String,
    },
    AddSocial {
        name: String,
        emoji: String,
        url: String,
    },
    UpdateSocial {
        id: i64,
        field: SocialField,
        value: String,
    },
    AddSubmenu {
        service: Service,
        name: String,
        text: String,
    },
    UpdateSubmenu {
        id: i64,
        field: SubmenuField,
        value: String,
    },
    PromoteAdmin(String),
    Broadcast(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) enum Transition {
    Ignore,
    Advance { next: PendingInput, draft: Draft },
    Commit(Commit),
}

pub(super) fn transition(pending: Option<&PendingInput>, draft: &Draft, input: Input<'_>) -> Transition {
    let Some(pending) = pending else {
        return Transition::Ignore;
    };
    if pending.expects() != input.kind() {
        return Transition::Ignore;
    }

    let value = input.value().trim().to_string();
    if value.is_empty() {
        return Transition::Ignore;
    }

    match pending {
        PendingInput::WelcomeMessage => config(ConfigField::WelcomeMessage, value),
        PendingInput::WelcomePhoto => config(ConfigField::WelcomeImage, value),
        PendingInput::MiniAppUrl => config(ConfigField::MiniAppUrl, value),
        PendingInput::MiniAppText => config(ConfigField::MiniAppText, value),
        PendingInput::ServiceText { service } => config(ConfigField::ServiceText(*service), value),
        PendingInput::ServicePhoto { service } => {
            config(ConfigField::ServiceImage(*service), value)
        }
        PendingInput::SocialName => advance(PendingInput::SocialEmoji, draft, DRAFT_NAME, value),
        PendingInput::SocialEmoji => advance(PendingInput::SocialUrl, draft, DRAFT_EMOJI, value),
        PendingInput::SocialUrl => {
            match (draft.get(DRAFT_NAME), draft.get(DRAFT_EMOJI)) {
                (Some(name), Some(emoji)) => Transition::Commit(Commit::AddSocial {
                    name: name.clone(),
                    emoji: emoji.clone(),
                    url: value,
                }),
                // Draft lost its earlier steps; nothing sensible to commit.
                _ => Transition::Ignore,
            }
        }
        PendingInput::SocialField { id, field } => Transition::Commit(Commit::UpdateSocial {
            id: *id,
            field: *field,
            value,
        }),
        PendingInput::SubmenuName { service } => advance(
            PendingInput::SubmenuText { service: *service },
            draft,
            DRAFT_NAME,
            value,
        ),
        PendingInput::SubmenuText { service } => match draft.get(DRAFT_NAME) {
            Some(name) => Transition::Commit(Commit::AddSubmenu {
                service: *service,
                name: name.clone(),
                text: value,
            }),
            None => Transition::Ignore,
        },
        PendingInput::SubmenuField { id, field } => Transition::Commit(Commit::UpdateSubmenu {
            id: *id,
            field: *field,
            value,
        }),
        PendingInput::AdminId => Transition::Commit(Commit::PromoteAdmin(value)),
        PendingInput::Broadcast => Transition::Commit(Commit::Broadcast(value)),
    }
}

fn config(field: ConfigField, value: String) -> Transition {
    Transition::Commit(Commit::Config { field, value })
}

fn advance(next: PendingInput, draft: &Draft, key: &str, value: String) -> Transition {
    let mut draft = draft.clone();
    draft.insert(key.to_string(), value);
    Transition::Advance { next, draft }
}

pub(super) fn draft_name(draft: &Draft) -> &str {
    draft.get(DRAFT_NAME).map(String::as_str).unwrap_or_default()
}

pub(super) fn draft_emoji(draft: &Draft) -> &str {
    draft.get(DRAFT_EMOJI).map(String::as_str).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_state_ignores_text_and_photo() {
        let draft = Draft::new();
        assert_eq!(transition(None, &draft, Input::Text("hello")), Transition::Ignore);
        assert_eq!(transition(None, &draft, Input::Photo("file-id")), Transition::Ignore);
    }

    #[test]
    fn wrong_input_kind_is_ignored() {
        let draft = Draft::new();
        let pending = PendingInput::WelcomePhoto;
        assert_eq!(
            transition(Some(&pending), &draft, Input::Text("not a photo")),
            Transition::Ignore
        );
        let pending = PendingInput::WelcomeMessage;
        assert_eq!(
            transition(Some(&pending), &draft, Input::Photo("file-id")),
            Transition::Ignore
        );
    }

    #[test]
    fn social_wizard_chains_name_emoji_url() {
        let first = transition(Some(&PendingInput::SocialName), &Draft::new(), Input::Text("Instagram"));
        let Transition::Advance { next, draft } = first else {
            panic!("expected advance, got {:?}", first);
        };
        assert_eq!(next, PendingInput::SocialEmoji);
        assert_eq!(draft_name(&draft), "Instagram");

        let second = transition(Some(&next), &draft, Input::Text("📷"));
        let Transition::Advance { next, draft } = second else {
            panic!("expected advance, got {:?}", second);
        };
        assert_eq!(next, PendingInput::SocialUrl);
        assert_eq!(draft_emoji(&draft), "📷");

        let last = transition(Some(&next), &draft, Input::Text(" https://instagram.com "));
        assert_eq!(
            last,
            Transition::Commit(Commit::AddSocial {
                name: "Instagram".to_string(),
                emoji: "📷".to_string(),
                url: "https://instagram.com".to_string(),
            })
        );
    }

    #[test]
    fn submenu_image_edit_expects_photo() {
        let pending = PendingInput::SubmenuField {
            id: 4,
            field: SubmenuField::Image,
        };
        assert_eq!(
            transition(Some(&pending), &Draft::new(), Input::Photo("AgAD")),
            Transition::Commit(Commit::UpdateSubmenu {
                id: 4,
                field: SubmenuField::Image,
                value: "AgAD".to_string(),
            })
        );
    }

    #[test]
    fn only_message_bodies_take_formatting() {
        assert!(PendingInput::WelcomeMessage.takes_formatting());
        assert!(PendingInput::Broadcast.takes_formatting());
        assert!(PendingInput::SubmenuField {
            id: 1,
            field: SubmenuField::Text
        }
        .takes_formatting());
        assert!(!PendingInput::SocialName.takes_formatting());
        assert!(!PendingInput::MiniAppText.takes_formatting());
        assert!(!PendingInput::SubmenuField {
            id: 1,
            field: SubmenuField::Name
        }
        .takes_formatting());
    }

    #[test]
    fn blank_text_is_ignored() {
        assert_eq!(
            transition(Some(&PendingInput::MiniAppUrl), &Draft::new(), Input::Text("   ")),
            Transition::Ignore
        );
    }

    #[test]
    fn pending_input_survives_json_round_trip() {
        let state = UserState {
            pending: Some(PendingInput::ServiceText {
                service: Service::Postal,
            }),
            draft: Draft::new(),
            last_message_id: Some(42),
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: UserState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
