use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const CANCEL_LAST_ADD: &str = "cancel_last_add";
    pub const QUEUE_PAGE: &str = "queue_page";
}

/// Botón para deshacer el último añadido; el id lleva la entrada.
pub fn cancel_last_add_row(entry_id: u64) -> CreateActionRow {
    let button = CreateButton::new(format!("{}:{}", button_ids::CANCEL_LAST_ADD, entry_id))
        .label("Cancelar")
        .emoji('🗑')
        .style(ButtonStyle::Danger);

    CreateActionRow::Buttons(vec![button])
}

/// Botones de navegación de `/queue`.
pub fn queue_navigation_row(page: usize, total_pages: usize) -> CreateActionRow {
    let prev = CreateButton::new(format!("{}:{}", button_ids::QUEUE_PAGE, page.saturating_sub(1)))
        .emoji('◀')
        .style(ButtonStyle::Secondary)
        .disabled(page == 0);

    let next = CreateButton::new(format!("{}:{}", button_ids::QUEUE_PAGE, page + 1))
        .emoji('▶')
        .style(ButtonStyle::Secondary)
        .disabled(page + 1 >= total_pages);

    CreateActionRow::Buttons(vec![prev, next])
}

/// Acción decodificada de un `custom_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    CancelLastAdd(u64),
    QueuePage(usize),
}

pub fn parse_custom_id(custom_id: &str) -> Option<ButtonAction> {
    let (kind, value) = custom_id.split_once(':')?;
    match kind {
        button_ids::CANCEL_LAST_ADD => value.parse().ok().map(ButtonAction::CancelLastAdd),
        button_ids::QUEUE_PAGE => value.parse().ok().map(ButtonAction::QueuePage),
        _ => None,
    }
}
