//! Small utility helpers used across modules.

use std::collections::HashSet;

use rand::{distributions::Alphanumeric, Rng};

use crate::domain::{Exercise, ToolType};

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) { cut -= 1; }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

/// Every `uniqueName` currently present anywhere in the exercise.
pub fn taken_names(exercise: &Exercise) -> HashSet<&str> {
  exercise
    .pages
    .iter()
    .flat_map(|p| p.tools.iter())
    .map(|t| t.unique_name.as_str())
    .collect()
}

/// Fresh tool name, e.g. `mcq_single-4fT9qk2LZa`, distinct from everything in `taken`.
pub fn unique_name(tool_type: ToolType, taken: &HashSet<&str>) -> String {
  let prefix = tool_type.as_str().to_ascii_lowercase();
  let mut rng = rand::thread_rng();
  loop {
    let suffix: String = (&mut rng).sample_iter(&Alphanumeric).take(10).map(char::from).collect();
    let name = format!("{prefix}-{suffix}");
    if !taken.contains(name.as_str()) {
      return name;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn template_and_truncation() {
    assert_eq!(fill_template("Hi {who}, {who}!", &[("who", "Ana")]), "Hi Ana, Ana!");
    assert_eq!(trunc_for_log("short", 10), "short");
    assert!(trunc_for_log("ééééé", 3).starts_with("é…"));
  }

  #[test]
  fn unique_names_avoid_taken_set() {
    let first = unique_name(ToolType::ChatBot, &HashSet::new());
    assert!(first.starts_with("chat_bot-"));
    let taken: HashSet<&str> = [first.as_str()].into_iter().collect();
    assert_ne!(unique_name(ToolType::ChatBot, &taken), first);
  }
}
