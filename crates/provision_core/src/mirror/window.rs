//! Host windowing operations used to embed the mirror window.
//!
//! Only Win32 supports embedding; other platforms get
//! [`UnsupportedWindowHost`], which makes the supervisor refuse to start.

use super::errors::{MirrorError, MirrorResult};

/// Native window handle (an `HWND` on Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub isize);

/// Position and size inside the parent surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Placement {
    /// Top-left corner at the origin.
    pub fn at_origin(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

pub trait WindowHost: Send {
    fn is_supported(&self) -> bool;

    /// Top-level window with exactly this title.
    fn find_window(&self, title: &str) -> Option<WindowHandle>;

    /// Remove caption, thick frame, minimize/maximize and system menu.
    fn strip_decorations(&self, window: WindowHandle) -> MirrorResult<()>;

    fn set_parent(&self, window: WindowHandle, parent: WindowHandle) -> MirrorResult<()>;

    fn set_position_and_size(&self, window: WindowHandle, placement: Placement)
        -> MirrorResult<()>;
}

/// Host for platforms without embedding support.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedWindowHost;

impl WindowHost for UnsupportedWindowHost {
    fn is_supported(&self) -> bool {
        false
    }

    fn find_window(&self, _title: &str) -> Option<WindowHandle> {
        None
    }

    fn strip_decorations(&self, _window: WindowHandle) -> MirrorResult<()> {
        Err(MirrorError::embed("window embedding is not supported here"))
    }

    fn set_parent(&self, _window: WindowHandle, _parent: WindowHandle) -> MirrorResult<()> {
        Err(MirrorError::embed("window embedding is not supported here"))
    }

    fn set_position_and_size(
        &self,
        _window: WindowHandle,
        _placement: Placement,
    ) -> MirrorResult<()> {
        Err(MirrorError::embed("window embedding is not supported here"))
    }
}

#[cfg(windows)]
pub use win32::Win32WindowHost;

/// The window host for the current platform.
pub fn platform_window_host() -> Box<dyn WindowHost> {
    #[cfg(windows)]
    {
        Box::new(Win32WindowHost)
    }
    #[cfg(not(windows))]
    {
        Box::new(UnsupportedWindowHost)
    }
}

#[cfg(windows)]
mod win32 {
    use std::ffi::OsStr;
    use std::iter::once;
    use std::os::windows::ffi::OsStrExt;
    use std::ptr::null;

    use winapi::shared::windef::HWND;
    use winapi::um::errhandlingapi::{GetLastError, SetLastError};
    use winapi::um::winuser::{
        FindWindowW, GetWindowLongW, SetParent, SetWindowLongW, SetWindowPos, GWL_STYLE, HWND_TOP,
        SWP_SHOWWINDOW, WS_CAPTION, WS_MAXIMIZE, WS_MINIMIZE, WS_SYSMENU, WS_THICKFRAME,
    };

    use super::{MirrorError, MirrorResult, Placement, WindowHandle, WindowHost};

    #[derive(Debug, Default, Clone, Copy)]
    pub struct Win32WindowHost;

    fn hwnd(window: WindowHandle) -> HWND {
        window.0 as HWND
    }

    fn wide(text: &str) -> Vec<u16> {
        OsStr::new(text).encode_wide().chain(once(0)).collect()
    }

    impl WindowHost for Win32WindowHost {
        fn is_supported(&self) -> bool {
            true
        }

        fn find_window(&self, title: &str) -> Option<WindowHandle> {
            let title = wide(title);
            let found = unsafe { FindWindowW(null(), title.as_ptr()) };
            if found.is_null() {
                None
            } else {
                Some(WindowHandle(found as isize))
            }
        }

        fn strip_decorations(&self, window: WindowHandle) -> MirrorResult<()> {
            let mask = (WS_CAPTION | WS_THICKFRAME | WS_MINIMIZE | WS_MAXIMIZE | WS_SYSMENU) as i32;
            // Both calls may legitimately return 0; only a set last-error means failure.
            let (style, read_error) = unsafe {
                SetLastError(0);
                let style = GetWindowLongW(hwnd(window), GWL_STYLE);
                (style, GetLastError())
            };
            if style == 0 && read_error != 0 {
                return Err(MirrorError::embed(format!(
                    "GetWindowLongW failed (error {})",
                    read_error
                )));
            }

            let (previous, write_error) = unsafe {
                SetLastError(0);
                let previous = SetWindowLongW(hwnd(window), GWL_STYLE, style & !mask);
                (previous, GetLastError())
            };
            if previous == 0 && write_error != 0 {
                return Err(MirrorError::embed(format!(
                    "SetWindowLongW failed (error {})",
                    write_error
                )));
            }
            Ok(())
        }

        fn set_parent(&self, window: WindowHandle, parent: WindowHandle) -> MirrorResult<()> {
            let previous = unsafe { SetParent(hwnd(window), hwnd(parent)) };
            if previous.is_null() {
                let error = unsafe { GetLastError() };
                return Err(MirrorError::embed(format!("SetParent failed (error {})", error)));
            }
            Ok(())
        }

        fn set_position_and_size(
            &self,
            window: WindowHandle,
            placement: Placement,
        ) -> MirrorResult<()> {
            let ok = unsafe {
                SetWindowPos(
                    hwnd(window),
                    HWND_TOP,
                    placement.x,
                    placement.y,
                    placement.width as i32,
                    placement.height as i32,
                    SWP_SHOWWINDOW,
                )
            };
            if ok == 0 {
                Err(MirrorError::embed("SetWindowPos failed"))
            } else {
                Ok(())
            }
        }
    }
}
