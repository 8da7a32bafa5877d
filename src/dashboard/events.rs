use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};

use super::app::{App, Page};
use crate::clicks::Clock;
use crate::narration::NarrationEngine;

pub fn handle_key_event<E: NarrationEngine, C: Clock>(key: KeyEvent, app: &mut App<E, C>) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.should_quit = true;
        }
        KeyCode::Char('r') => app.refresh(),
        KeyCode::Tab | KeyCode::BackTab => app.next_page(),
        KeyCode::Char('l') => app.logout(),
        KeyCode::Char(c @ '1'..='7') => {
            if let Some(index) = c.to_digit(10) {
                app.select_chart(index as usize);
            }
        }
        KeyCode::Char('s') => app.click_narrate(),
        KeyCode::Char(' ') if app.page == Page::Profile => app.click_narrate(),
        KeyCode::Up => app.select_prev_region(),
        KeyCode::Down => app.select_next_region(),
        _ => {}
    }
}

pub fn handle_mouse_event<E: NarrationEngine, C: Clock>(mouse: MouseEvent, app: &mut App<E, C>) {
    if mouse.kind != MouseEventKind::Down(MouseButton::Left) {
        return;
    }
    let button = app.narrate_button;
    let inside = mouse.column >= button.x
        && mouse.column < button.x.saturating_add(button.width)
        && mouse.row >= button.y
        && mouse.row < button.y.saturating_add(button.height);
    if inside {
        app.click_narrate();
    }
}
