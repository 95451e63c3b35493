use camfeed_common::action::Action;

/// Selection page for `current`: the live stream plus links to every mode.
pub fn render(current: Action) -> String {
    let links: String = Action::ALL
        .iter()
        .map(|&action| {
            if action == current {
                format!("<li><strong>{}</strong></li>", action.label())
            } else {
                format!(r#"<li><a href="{}">{}</a></li>"#, action.path(), action.label())
            }
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>camfeed - {title}</title>
</head>
<body>
<h1>{title}</h1>
<img src="/video_feed" alt="live camera feed">
<ul>{links}</ul>
</body>
</html>
"#,
        title = current.label(),
    )
}
