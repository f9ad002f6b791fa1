//! The `recallkit init` command.

use std::path::Path;

use anyhow::Result;

use recallkit_collaborators::config::{RecallkitConfig, CONFIG_FILE_NAME};

pub fn execute() -> Result<()> {
    let config = RecallkitConfig::default();

    if Path::new(CONFIG_FILE_NAME).exists() {
        println!("{CONFIG_FILE_NAME} already exists, skipping.");
    } else {
        let body = format!("# recallkit configuration\n\n{}", config.to_toml_string()?);
        std::fs::write(CONFIG_FILE_NAME, body)?;
        println!("Created {CONFIG_FILE_NAME}");
    }

    let word_bank = &config.word_bank;
    if word_bank.exists() {
        println!("{} already exists, skipping.", word_bank.display());
    } else {
        std::fs::write(word_bank, STARTER_WORDS)?;
        println!("Created {}", word_bank.display());
    }

    println!("\nNext steps:");
    println!("  1. Replace the words in {} with your own pool", word_bank.display());
    println!("  2. Run: recallkit validate --word-list {}", word_bank.display());
    println!("  3. Run: recallkit generate --count 15");

    Ok(())
}

const STARTER_WORDS: &str = "# One word per line. Lines starting with # are ignored.
drum
curtain
bell
coffee
school
parent
moon
garden
hat
farmer
nose
turkey
colour
house
river
desk
ranger
bird
shoe
stove
mountain
glasses
towel
cloud
boat
lamb
gun
pencil
church
fish
";
