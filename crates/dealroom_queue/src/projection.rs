use dealroom_contract::QueueRow;

use crate::item::TransferItem;

pub fn project(items: &[TransferItem]) -> Vec<QueueRow> {
    items.iter().map(project_item).collect()
}

pub fn project_item(item: &TransferItem) -> QueueRow {
    let status = item.status();
    QueueRow {
        item_id: item.id().to_string(),
        name: item.file().name.clone(),
        size_label: size_label(item.file().size_bytes()),
        status,
        progress_percent: item.progress_percent(),
        error_message: item.error().map(ToString::to_string),
        can_cancel: status.can_cancel(),
    }
}

pub fn size_label(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
