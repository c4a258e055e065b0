use std::fmt::Display;
use termenu::{Item, Menu};

use super::PickerError;

pub struct FzfInvoker<T> {
    msg: String,
    items: Vec<T>,
}

// NOTE: items are rendered through std::fmt::Display
impl<T> FzfInvoker<T>
where
    T: Display + Clone,
{
    pub fn new(msg: String, items: Vec<T>) -> Self {
        Self { msg, items }
    }

    /// Show an fzf-like menu and return the selected item (cloned), or
    /// `None` if the user cancelled.
    pub fn invoke(&self) -> Result<Option<T>, PickerError> {
        let mut menu = Menu::new().map_err(|e| PickerError::Terminal(e.to_string()))?;

        let list: Vec<Item<usize>> = self
            .items
            .iter()
            .enumerate()
            .map(|(idx, item)| Item::new(&format!("{item}"), idx))
            .collect();

        let selected_index = menu
            .set_title(self.msg.as_str())
            .add_list(list)
            .select()
            .map_err(|e| PickerError::Terminal(e.to_string()))?
            .copied();

        Ok(selected_index.and_then(|idx| self.items.get(idx).cloned()))
    }
}
