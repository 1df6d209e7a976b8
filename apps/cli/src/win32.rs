//! Hidden parent window and message pump for the system manager.

use anyhow::{Context, Result};
use twain_core::{DsmEntry, PlatformMessage, WindowHandle};
use windows::Win32::Foundation::{HINSTANCE, HWND};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DestroyWindow, DispatchMessageW, GetMessageW, HMENU, MSG, TranslateMessage,
    WINDOW_EX_STYLE, WINDOW_STYLE,
};
use windows::core::w;

use crate::Session;

/// Invisible window that parents the source's dialogs.
pub struct HiddenWindow(HWND);

impl HiddenWindow {
    pub fn create() -> Result<Self> {
        let hwnd = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE(0),
                w!("STATIC"),
                w!("twain-cli"),
                WINDOW_STYLE(0),
                0,
                0,
                0,
                0,
                HWND::default(),
                HMENU::default(),
                HINSTANCE::default(),
                None,
            )
        }
        .context("Failed to create message window")?;
        Ok(Self(hwnd))
    }

    pub fn handle(&self) -> WindowHandle {
        WindowHandle(self.0.0 as isize)
    }
}

impl Drop for HiddenWindow {
    fn drop(&mut self) {
        unsafe {
            let _ = DestroyWindow(self.0);
        }
    }
}

fn platform_message(msg: &MSG) -> PlatformMessage {
    PlatformMessage {
        hwnd: WindowHandle(msg.hwnd.0 as isize),
        message: msg.message,
        wparam: msg.wParam.0,
        lparam: msg.lParam.0,
        time: msg.time,
        x: msg.pt.x,
        y: msg.pt.y,
    }
}

/// Pump thread messages until the scan ends, offering each to the session
/// before dispatch.
pub fn pump<D: DsmEntry>(session: &mut Session<D>) -> Result<()> {
    let mut msg = MSG::default();
    while session.is_scanning() {
        let got = unsafe { GetMessageW(&mut msg, HWND::default(), 0, 0) };
        match got.0 {
            0 => break,
            -1 => anyhow::bail!("GetMessageW failed"),
            _ => {}
        }
        if session.filter_message(&platform_message(&msg)) {
            continue;
        }
        unsafe {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
    Ok(())
}
