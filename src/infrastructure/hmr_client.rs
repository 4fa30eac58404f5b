/// Websocket endpoint the client connects to, relative to the page origin
pub const WS_PATH: &str = "/__tailpack/ws";
/// Standalone copy of the client, for pages that load it directly
pub const CLIENT_PATH: &str = "/__tailpack/client.js";

/// Browser runtime for live reload.
///
/// Prepended to every development script entry. It talks to the dev server
/// over [`WS_PATH`] on the page's own origin, so it keeps working when the
/// page is served through the proxy.
pub fn generate_client_code(overlay: bool) -> String {
    format!(
        r#"// tailpack live reload client
(function () {{
    'use strict';

    if (typeof window === 'undefined' || window.__TAILPACK_CLIENT__) {{
        return;
    }}

    const WS_PATH = '{ws_path}';
    const SHOW_OVERLAY = {overlay};
    const OVERLAY_ID = '__tailpack_error_overlay__';

    class TailpackClient {{
        constructor() {{
            this.ws = null;
            this.generation = null;
            this.reconnectAttempts = 0;
            this.maxReconnectAttempts = 20;
            this.reconnectDelay = 500;
            this.connect();
        }}

        url() {{
            const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
            return `${{protocol}}//${{window.location.host}}${{WS_PATH}}`;
        }}

        connect() {{
            try {{
                this.ws = new WebSocket(this.url());
            }} catch (error) {{
                console.warn('[tailpack] connection failed:', error);
                this.scheduleReconnect();
                return;
            }}

            this.ws.onopen = () => {{
                this.reconnectAttempts = 0;
            }};

            this.ws.onmessage = (event) => {{
                let message;
                try {{
                    message = JSON.parse(event.data);
                }} catch (error) {{
                    console.warn('[tailpack] invalid message:', error);
                    return;
                }}
                this.handle(message);
            }};

            this.ws.onclose = () => this.scheduleReconnect();
        }}

        handle(message) {{
            switch (message.type) {{
                case 'connected':
                    // Server restarted behind our back: the page is stale
                    if (this.generation !== null && message.generation !== this.generation) {{
                        window.location.reload();
                        return;
                    }}
                    this.generation = message.generation;
                    console.log('[tailpack] connected');
                    break;

                case 'css-update':
                    message.updates.forEach((update) => this.swapStylesheet(update));
                    break;

                case 'full-reload':
                    console.log(`[tailpack] ${{message.reason}}, reloading`);
                    window.location.reload();
                    break;

                case 'error':
                    console.error('[tailpack] build failed:', message.message);
                    this.showOverlay(message);
                    break;

                case 'ok':
                    this.generation = message.generation;
                    this.hideOverlay();
                    break;

                default:
                    console.log('[tailpack] unknown message:', message.type);
            }}
        }}

        swapStylesheet(update) {{
            const links = Array.from(document.querySelectorAll('link[rel="stylesheet"]'));
            const current = links.find((link) => {{
                const href = new URL(link.href, window.location.href).pathname;
                return update.previousUrl && href === new URL(update.previousUrl, window.location.href).pathname;
            }});

            if (!current) {{
                window.location.reload();
                return;
            }}

            const next = current.cloneNode();
            next.href = update.url;
            next.onload = () => current.remove();
            current.parentNode.insertBefore(next, current.nextSibling);
            console.log(`[tailpack] ${{update.name}} updated`);
        }}

        scheduleReconnect() {{
            if (this.reconnectAttempts >= this.maxReconnectAttempts) {{
                console.warn('[tailpack] giving up on the dev server');
                return;
            }}
            this.reconnectAttempts++;
            setTimeout(() => this.connect(), this.reconnectDelay * this.reconnectAttempts);
        }}

        showOverlay(message) {{
            if (!SHOW_OVERLAY) {{
                return;
            }}
            this.hideOverlay();

            const overlay = document.createElement('div');
            overlay.id = OVERLAY_ID;
            overlay.style.cssText = `
                position: fixed;
                inset: 0;
                background: rgba(0, 0, 0, 0.9);
                color: #ff5555;
                font-family: 'Menlo', 'Monaco', 'Courier New', monospace;
                font-size: 14px;
                padding: 20px;
                box-sizing: border-box;
                z-index: 999999;
                overflow: auto;
            `;

            const header = document.createElement('h2');
            header.style.cssText = 'margin: 0 0 12px 0; font-size: 22px;';
            header.textContent = 'Build failed';
            overlay.appendChild(header);

            if (message.file) {{
                const file = document.createElement('div');
                file.style.cssText = 'color: #f8f8f2; margin-bottom: 12px;';
                file.textContent = message.file;
                overlay.appendChild(file);
            }}

            const body = document.createElement('pre');
            body.style.cssText = `
                white-space: pre-wrap;
                word-wrap: break-word;
                background: rgba(255, 255, 255, 0.05);
                padding: 15px;
                border-left: 4px solid #ff5555;
                margin: 0;
            `;
            body.textContent = message.message;
            overlay.appendChild(body);

            document.body.appendChild(overlay);
        }}

        hideOverlay() {{
            const overlay = document.getElementById(OVERLAY_ID);
            if (overlay) {{
                overlay.remove();
            }}
        }}
    }}

    window.__TAILPACK_CLIENT__ = new TailpackClient();
}})();
"#,
        ws_path = WS_PATH,
        overlay = overlay,
    )
}
