use super::Scene;
use tracing::{info, warn};

/// Marks the start of the generation directive inside a scene block.
pub const DIRECTIVE_MARKER: &str = "Shot on";

/// Unicode LINE SEPARATOR, pasted in by some editors in place of `\n`.
const LINE_SEPARATOR: char = '\u{2028}';

/// Splits a numbered script into scenes, in the order they appear.
///
/// A line holding only a positive number starts a scene; its body runs to the next such
/// line or the end of input. Text before the first numbered line is ignored.
/// Returns an empty vec when nothing numbered is found.
pub fn parse_script(raw_text: &str) -> Vec<Scene> {
    let text = normalize_line_breaks(raw_text);

    let mut scenes = Vec::new();
    let mut current: Option<(u32, Vec<&str>)> = None;

    for line in text.lines() {
        if let Some(id) = scene_number(line) {
            if let Some((prev_id, body)) = current.take() {
                scenes.push(build_scene(prev_id, &body));
            }
            current = Some((id, Vec::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }
    if let Some((id, body)) = current {
        scenes.push(build_scene(id, &body));
    }

    info!("Parsed {} scenes from script", scenes.len());
    scenes
}

fn normalize_line_breaks(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace(LINE_SEPARATOR, "\n")
}

fn scene_number(line: &str) -> Option<u32> {
    let trimmed = line.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match trimmed.parse::<u32>() {
        Ok(0) => {
            warn!("Scene number 0 is not a valid scene id, treating it as text");
            None
        }
        Ok(id) => Some(id),
        Err(_) => {
            warn!("Scene number {} is out of range, treating it as text", trimmed);
            None
        }
    }
}

fn build_scene(id: u32, body: &[&str]) -> Scene {
    let block = body.join("\n");
    let (source_text, prompt) = split_directive(&block);
    Scene::new(id, source_text, prompt)
}

fn split_directive(block: &str) -> (String, String) {
    match block.find(DIRECTIVE_MARKER) {
        Some(pos) => (
            block[..pos].trim().to_string(),
            block[pos..].trim().to_string(),
        ),
        None => (block.trim().to_string(), String::new()),
    }
}
