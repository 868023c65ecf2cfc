use anyhow::Context;
use clap::Subcommand;
use commandeer_core::CommandeerConfig;
use commandeer_templates::TemplateLibrary;

#[derive(Subcommand, Debug)]
pub enum TemplatesCommand {
    /// List available templates
    List {
        /// Only templates carrying this tag
        #[arg(long)]
        tag: Option<String>,
    },

    /// Show one template in full
    Show { name: String },
}

pub fn run(cmd: TemplatesCommand, config: &CommandeerConfig) -> anyhow::Result<()> {
    let library = match &config.templates_dir {
        Some(dir) => TemplateLibrary::load(dir)?,
        None => TemplateLibrary::builtin(),
    };

    match cmd {
        TemplatesCommand::List { tag } => {
            let templates = library.list(tag.as_deref());
            if templates.is_empty() {
                println!("No templates found.");
                return Ok(());
            }

            println!("{:<28} {:<10} {}", "NAME", "COMMANDS", "DESCRIPTION");
            for template in templates {
                println!(
                    "{:<28} {:<10} {}",
                    template.name,
                    template.commands.len(),
                    template.description.as_deref().unwrap_or("-"),
                );
            }
            Ok(())
        }

        TemplatesCommand::Show { name } => {
            let template = library
                .get(&name)
                .with_context(|| format!("template '{name}' not found"))?;

            println!("{}", template.name);
            if let Some(description) = &template.description {
                println!("  {description}");
            }
            if !template.tags.is_empty() {
                println!("  tags: {}", template.tags.join(", "));
            }
            println!();
            for command in &template.commands {
                println!("  {command}");
            }
            if !template.variables.is_empty() {
                println!();
                println!("  variables (defaults):");
                for (name, value) in &template.variables {
                    println!("    {name} = {value}");
                }
            }
            Ok(())
        }
    }
}
