use colored::Colorize;

pub struct Theme {
    pub url: fn(&str) -> String,
    pub danger: fn(&str) -> String,
    pub safe: fn(&str) -> String,
    pub suspicious: fn(&str) -> String,
    pub label: fn(&str) -> String,
    pub value: fn(&str) -> String,
    pub note: fn(&str) -> String,
}

impl Theme {
    pub fn from_name(name: &str) -> Self {
        match name {
            "default" | "" => Self::default_theme(),
            "plain" => Self::plain(),
            _ => {
                eprintln!("{}", format!("✘ Unknown theme: {}", name).red());
                Self::default_theme()
            }
        }
    }

    fn default_theme() -> Self {
        Self {
            url: |s| s.bright_white().underline().to_string(),
            danger: |s| s.bright_red().bold().to_string(),
            safe: |s| s.green().bold().to_string(),
            suspicious: |s| s.yellow().bold().to_string(),
            label: |s| s.cyan().to_string(),
            value: |s| s.white().to_string(),
            note: |s| s.bright_black().italic().to_string(),
        }
    }

    fn plain() -> Self {
        Self {
            url: |s| s.to_string(),
            danger: |s| s.to_string(),
            safe: |s| s.to_string(),
            suspicious: |s| s.to_string(),
            label: |s| s.to_string(),
            value: |s| s.to_string(),
            note: |s| s.to_string(),
        }
    }
}
