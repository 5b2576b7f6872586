//! Plain-text rendering for terminal output.

use chrono::{DateTime, Local, Utc};

use cli_unites_core::models::Note;

const TOKEN_PREFIX_LEN: usize = 12;

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// One-line listing entry: `<short id>  <date>  <title>  [tags]`.
pub fn note_line(note: &Note) -> String {
    let mut line = format!(
        "{}  {}  {}",
        note.short_id(),
        format_timestamp(&note.created_at),
        note.title
    );
    if !note.tags.is_empty() {
        line.push_str(&format!("  [{}]", note.tags.join(", ")));
    }
    line
}

/// First line of the body, shortened for listings.
pub fn body_preview(body: &str, max_chars: usize) -> Option<String> {
    let first = body.trim().lines().next()?.trim();
    if first.is_empty() {
        return None;
    }
    if first.chars().count() > max_chars {
        let cut: String = first.chars().take(max_chars).collect();
        Some(format!("{}...", cut))
    } else {
        Some(first.to_string())
    }
}

pub fn print_note_list(notes: &[Note]) {
    for note in notes {
        println!("{}", note_line(note));
        if let Some(preview) = body_preview(&note.body, 72) {
            println!("    {}", preview);
        }
    }
}

/// Full detail view used by `show` and `edit`.
pub fn note_detail(note: &Note) -> String {
    let mut out = String::new();
    out.push_str("--- Note ---\n");
    out.push_str(&format!("id:         {}\n", note.id));
    out.push_str(&format!("title:      {}\n", note.title));
    if !note.tags.is_empty() {
        out.push_str(&format!("tags:       {}\n", note.tags.join(", ")));
    }
    if let Some(team) = &note.team_id {
        out.push_str(&format!("team:       {}\n", team));
    }
    if let Some(project) = &note.project_path {
        match &note.path {
            Some(path) => out.push_str(&format!("project:    {} ({})\n", project, path)),
            None => out.push_str(&format!("project:    {}\n", project)),
        }
    }
    match (&note.git_branch, &note.git_commit) {
        (Some(branch), Some(commit)) => {
            let short: String = commit.chars().take(10).collect();
            out.push_str(&format!("git:        {} @ {}\n", branch, short));
        }
        (Some(branch), None) => out.push_str(&format!("git:        {}\n", branch)),
        (None, Some(commit)) => out.push_str(&format!("git:        {}\n", commit)),
        (None, None) => {}
    }
    out.push_str(&format!("created:    {}\n", format_timestamp(&note.created_at)));
    out.push_str(&format!("updated:    {}\n", format_timestamp(&note.updated_at)));
    out.push_str(&format!(
        "embedding:  {}\n",
        if note.has_embedding { "yes" } else { "pending" }
    ));
    out.push('\n');
    if note.body.trim().is_empty() {
        out.push_str("(empty)\n");
    } else {
        out.push_str(note.body.trim_end());
        out.push('\n');
    }
    out
}

/// Similarity in `[-1, 1]` as a whole percentage.
pub fn similarity_percent(similarity: f64) -> String {
    format!("{:.0}%", similarity * 100.0)
}

/// First 12 characters followed by `...`.
pub fn truncate_token(token: &str) -> String {
    let prefix: String = token.chars().take(TOKEN_PREFIX_LEN).collect();
    format!("{}...", prefix)
}

pub fn mask_secret(value: Option<&str>) -> &'static str {
    match value {
        Some(v) if !v.is_empty() => "***",
        _ => "(not set)",
    }
}
