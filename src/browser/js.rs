//! JavaScript helper snippets injected into the page, mirroring
//! `examples/original_source/app/tools/browser/browser_helpers.py`'s `HelperJs`.

/// Enumerates clickable elements in DOM order, filtered to those that are
/// visible and laid out. Returns a JSON array of `{index, tagName, text, ...}`.
pub const FIND_CLICKABLE: &str = r#"
(function findClickableElements() {
    const clickableElements = [];
    const selectors = [
        'a', 'button', 'input[type="button"]', 'input[type="submit"]',
        '.btn', '[role="button"]', '[onclick]', 'select', 'summary',
        'details', '[tabindex]:not([tabindex="-1"])'
    ];
    const elements = document.querySelectorAll(selectors.join(', '));
    elements.forEach((el, index) => {
        const rect = el.getBoundingClientRect();
        const style = window.getComputedStyle(el);
        const isVisible = !!(rect.width && rect.height &&
            style.getPropertyValue('display') !== 'none' &&
            style.getPropertyValue('visibility') !== 'hidden');
        if (isVisible) {
            clickableElements.push({
                index,
                tagName: el.tagName.toLowerCase(),
                id: el.id || '',
                text: (el.innerText || el.textContent || '').trim(),
                href: el.href || '',
                ariaLabel: el.getAttribute('aria-label') || '',
                x: Math.round(rect.x + rect.width / 2),
                y: Math.round(rect.y + rect.height / 2)
            });
        }
    });
    return JSON.stringify(clickableElements);
})();
"#;

/// Enumerates editable elements (inputs, textareas, contenteditable) the same
/// way, for `input`-by-index.
pub const FIND_INPUTS: &str = r#"
(function findInputElements() {
    const inputElements = [];
    const selectors = [
        'input:not([type="button"]):not([type="submit"]):not([type="reset"]):not([type="hidden"])',
        'textarea',
        '[contenteditable="true"]',
        '[role="textbox"]'
    ];
    const elements = document.querySelectorAll(selectors.join(', '));
    elements.forEach((el, index) => {
        const rect = el.getBoundingClientRect();
        const style = window.getComputedStyle(el);
        const isVisible = !!(rect.width && rect.height &&
            style.getPropertyValue('display') !== 'none' &&
            style.getPropertyValue('visibility') !== 'hidden');
        if (isVisible) {
            inputElements.push({
                index,
                tagName: el.tagName.toLowerCase(),
                placeholder: el.placeholder || '',
                ariaLabel: el.getAttribute('aria-label') || '',
                x: Math.round(rect.x + rect.width / 2),
                y: Math.round(rect.y + rect.height / 2)
            });
        }
    });
    return JSON.stringify(inputElements);
})();
"#;

/// Installs a `console.*` ring buffer once per page load.
pub const INIT_CONSOLE_LOGGING: &str = r#"
(function initializeConsoleLogging() {
    if (window.__consoleLogs) {
        return "already initialized";
    }
    window.__consoleLogs = [];
    const max = 200;
    const original = {
        log: console.log, info: console.info, warn: console.warn,
        error: console.error, debug: console.debug
    };
    ['log', 'info', 'warn', 'error', 'debug'].forEach((level) => {
        console[level] = function (...args) {
            window.__consoleLogs.push([level.toUpperCase(), ...args]
                .map((a) => (typeof a === 'object' ? JSON.stringify(a) : String(a)))
                .join(' '));
            if (window.__consoleLogs.length > max) {
                window.__consoleLogs.shift();
            }
            return original[level].apply(console, args);
        };
    });
    return "initialized";
})();
"#;

/// Returns the last `max_lines` console entries (or all of them).
pub fn console_logs_script(max_lines: Option<u32>) -> String {
    let slice = match max_lines {
        Some(n) => format!("logs.slice(Math.max(0, logs.length - {n}))"),
        None => "logs".to_string(),
    };
    format!(
        r#"(function() {{
    if (!window.__consoleLogs) return "console logging not initialized";
    const logs = window.__consoleLogs;
    return {slice}.join("\n");
}})();"#
    )
}
