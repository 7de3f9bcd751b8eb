use clap::ValueEnum;

/// Description appended when the recurring character is locked across scenes.
pub const LOCKED_CHARACTER: &str = "Recurring main character, identical in every scene: \
a Korean woman in her 20s with short black hair, subtle freckles, \
wearing a beige trench coat over a white shirt. Keep her face, hairstyle \
and outfit consistent.";

/// Label placed between the style block and the scene's own prompt.
pub const SCENE_LABEL: &str = "Scene description:";

/// Fixed visual style prefixed to every scene prompt.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StylePreset {
    Cinematic,
    Anime,
    Watercolor,
    Noir,
    Storybook,
}

impl StylePreset {
    pub fn template(self) -> &'static str {
        match self {
            StylePreset::Cinematic => {
                "Cinematic realism, 35mm film still, shallow depth of field, \
                 soft natural lighting, rich color grading, ultra-detailed, sharp focus."
            }
            StylePreset::Anime => {
                "Japanese anime key visual, clean line art, cel shading, \
                 vibrant colors, expressive eyes, detailed background painting."
            }
            StylePreset::Watercolor => {
                "Hand-painted watercolor illustration, soft bleeding edges, \
                 textured paper, muted pastel palette, gentle light."
            }
            StylePreset::Noir => {
                "Black and white film noir, high contrast, hard shadows, \
                 venetian blind lighting, smoky atmosphere, 1940s mood."
            }
            StylePreset::Storybook => {
                "Children's storybook illustration, warm colors, rounded shapes, \
                 gouache texture, whimsical and friendly composition."
            }
        }
    }
}

/// Builds the final request prompt for one scene.
///
/// With no style and an unlocked character the scene prompt passes through unchanged.
pub fn compose(scene_prompt: &str, style: Option<StylePreset>, lock_character: bool) -> String {
    if style.is_none() && !lock_character {
        return scene_prompt.to_string();
    }

    let mut style_block: Vec<&str> = Vec::new();
    if let Some(style) = style {
        style_block.push(style.template());
    }
    if lock_character {
        style_block.push(LOCKED_CHARACTER);
    }

    format!("{}\n\n{}\n{}", style_block.join("\n"), SCENE_LABEL, scene_prompt)
}
