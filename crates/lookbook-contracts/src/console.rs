use crate::config::{BatchVariety, ItemKind, Quality, Section, MODEL_ANGLE_SLOTS};

/// One `/add` invocation, parsed but not yet validated against the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSpec {
    pub section: Section,
    pub kind: ItemKind,
    pub text: String,
    pub strength: Option<f64>,
    pub image: Option<String>,
    pub angles: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuilderCommand {
    Noop,
    Help,
    Show,
    Payload,
    Reset,
    Generate,
    Quit,
    Save { path: String },
    Load { path: String },
    Count { value: u32 },
    Quality { value: Quality },
    Variety { value: BatchVariety },
    Preset { name: String },
    Add(Box<ItemSpec>),
    Remove { section: Section, id: String },
    Quick { prompt: String },
    Unknown { command: String },
    Invalid { message: String },
}

pub const BUILDER_HELP: &[&str] = &[
    "/add <section> <type> [--text <words>] [--image <url>] [--strength <0..1>] [--angles <6 urls>]",
    "/remove <section> <id>",
    "/count <n>   /quality <1K|2K|4K>   /variety <subtle|dynamic>   /preset <name>",
    "/show   /payload   /reset   /generate   /quick <prompt>",
    "/save <path>   /load <path>   /help   /quit",
];

/// Parses one line of builder input. Blank lines are no-ops; anything that
/// does not start with `/` is rejected with a pointer to `/help`.
pub fn parse_command(line: &str) -> BuilderCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return BuilderCommand::Noop;
    }
    let Some(tail) = trimmed.strip_prefix('/') else {
        return BuilderCommand::Invalid {
            message: "Commands start with '/'. Type /help for the list.".to_string(),
        };
    };

    let command_len = tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    if command_len == 0 {
        return BuilderCommand::Invalid {
            message: "Empty command. Type /help for the list.".to_string(),
        };
    }
    let command = tail[..command_len].to_ascii_lowercase();
    let arg = tail[command_len..].trim();

    match command.as_str() {
        "help" => BuilderCommand::Help,
        "show" => BuilderCommand::Show,
        "payload" => BuilderCommand::Payload,
        "reset" => BuilderCommand::Reset,
        "generate" => BuilderCommand::Generate,
        "quit" | "exit" => BuilderCommand::Quit,
        "save" | "load" => {
            let path = single_token(arg);
            if path.is_empty() {
                return invalid(format!("/{command} requires a file path"));
            }
            if command == "save" {
                BuilderCommand::Save { path }
            } else {
                BuilderCommand::Load { path }
            }
        }
        "count" => match arg.parse::<u32>() {
            Ok(value) if value >= 1 => BuilderCommand::Count { value },
            _ => invalid("/count requires a positive integer".to_string()),
        },
        "quality" => match Quality::from_label(arg) {
            Some(value) => BuilderCommand::Quality { value },
            None => invalid("/quality accepts 1K, 2K or 4K".to_string()),
        },
        "variety" => match BatchVariety::from_label(arg) {
            Some(value) => BuilderCommand::Variety { value },
            None => invalid("/variety accepts subtle or dynamic".to_string()),
        },
        "preset" => {
            let name = split_tokens(arg).join(" ");
            if name.is_empty() {
                return invalid("/preset requires a preset name".to_string());
            }
            BuilderCommand::Preset { name }
        }
        "quick" => {
            if arg.is_empty() {
                return invalid("/quick requires a prompt".to_string());
            }
            BuilderCommand::Quick {
                prompt: arg.to_string(),
            }
        }
        "remove" => parse_remove(arg),
        "add" => parse_add(arg),
        _ => BuilderCommand::Unknown { command },
    }
}

fn invalid(message: String) -> BuilderCommand {
    BuilderCommand::Invalid { message }
}

fn split_tokens(arg: &str) -> Vec<String> {
    match shell_words::split(arg) {
        Ok(parts) => parts.into_iter().filter(|part| !part.is_empty()).collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|part| !part.is_empty())
            .collect(),
    }
}

fn single_token(arg: &str) -> String {
    let parts = split_tokens(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

fn parse_remove(arg: &str) -> BuilderCommand {
    let tokens = split_tokens(arg);
    if tokens.len() != 2 {
        return invalid("/remove requires a section and an item id".to_string());
    }
    let Some(section) = Section::from_key(&tokens[0]) else {
        return invalid(format!("Unknown section '{}'", tokens[0]));
    };
    BuilderCommand::Remove {
        section,
        id: tokens[1].clone(),
    }
}

fn parse_add(arg: &str) -> BuilderCommand {
    let tokens = split_tokens(arg);
    if tokens.is_empty() {
        return invalid("/add requires a section and an item type".to_string());
    }
    let Some(section) = Section::from_key(&tokens[0]) else {
        return invalid(format!(
            "Unknown section '{}' (model, outfits, accessories, environment)",
            tokens[0]
        ));
    };

    let mut index = 1;
    let mut kind_words: Vec<&str> = Vec::new();
    while index < tokens.len() && !tokens[index].starts_with("--") {
        kind_words.push(tokens[index].as_str());
        index += 1;
    }
    if kind_words.is_empty() {
        return invalid("/add requires an item type".to_string());
    }
    let kind_label = kind_words.join(" ");
    let Some(kind) = ItemKind::from_label(&kind_label) else {
        return invalid(format!("Unknown item type '{kind_label}'"));
    };
    if !section.allowed_kinds().contains(&kind) {
        let allowed = section
            .allowed_kinds()
            .iter()
            .map(|kind| kind.label())
            .collect::<Vec<&str>>()
            .join(", ");
        return invalid(format!("'{kind}' is not a {section} type ({allowed})"));
    }

    let mut text_words: Vec<String> = Vec::new();
    let mut strength: Option<f64> = None;
    let mut image: Option<String> = None;
    let mut angles: Option<Vec<String>> = None;
    while index < tokens.len() {
        let flag = tokens[index].as_str();
        index += 1;
        let mut values: Vec<String> = Vec::new();
        while index < tokens.len() && !tokens[index].starts_with("--") {
            values.push(tokens[index].clone());
            index += 1;
        }
        match flag {
            "--text" => text_words = values,
            "--image" => {
                let Some(url) = values.first() else {
                    return invalid("--image requires a url".to_string());
                };
                image = Some(url.clone());
            }
            "--strength" => {
                let parsed = values.first().and_then(|raw| raw.parse::<f64>().ok());
                match parsed {
                    Some(value) if (0.0..=1.0).contains(&value) => strength = Some(value),
                    _ => return invalid("--strength requires a number in [0, 1]".to_string()),
                }
            }
            "--angles" => {
                if values.len() != MODEL_ANGLE_SLOTS.len() {
                    return invalid(format!(
                        "--angles requires exactly {} urls in slot order ({}), got {}",
                        MODEL_ANGLE_SLOTS.len(),
                        MODEL_ANGLE_SLOTS.join(", "),
                        values.len()
                    ));
                }
                angles = Some(values);
            }
            _ => return invalid(format!("Unknown flag '{flag}'")),
        }
    }

    let text = text_words.join(" ");
    if text.is_empty() && image.is_none() && angles.is_none() {
        return invalid("Give the item a description or an image reference".to_string());
    }

    BuilderCommand::Add(Box::new(ItemSpec {
        section,
        kind,
        text,
        strength,
        image,
        angles,
    }))
}
