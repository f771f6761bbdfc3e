use dealroom_contract::Destination;

/// Builds `{collection}/{folder...}/{item_id}-{name}`. The item id prefix keeps
/// same-named files from one batch apart.
pub fn object_path(destination: &Destination, item_id: &str, file_name: &str) -> String {
    let mut segments = vec![non_empty(sanitize_segment(&destination.collection_id), "collection")];
    segments.extend(
        destination
            .folder
            .split('/')
            .map(sanitize_segment)
            .filter(|segment| !segment.is_empty()),
    );
    segments.push(format!(
        "{item_id}-{}",
        non_empty(sanitize_segment(file_name), "file")
    ));
    segments.join("/")
}

fn sanitize_segment(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}

fn non_empty(segment: String, fallback: &str) -> String {
    if segment.is_empty() {
        fallback.to_string()
    } else {
        segment
    }
}
