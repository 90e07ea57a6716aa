//! Example: drive a multi-step exchange from the connect callback.
//!
//! Talks to a line-based server (an SMTP server on port 25, say): reads the
//! greeting, sends a command, reads the answer, then says goodbye.

use tether::{Client, EventLoop, Request, Termination};

fn main() {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_owned());
    let port = args.next().and_then(|p| p.parse().ok()).unwrap_or(25);

    let mut event_loop = EventLoop::new().unwrap();
    let client = Client::builder().build(&event_loop);

    let request = Request::new(host, port).read(false).on_connect(|conn| {
        println!("Connected to {}", conn.peer());

        conn.add_read(Termination::delimiter("\r\n"), |greeting, conn| {
            match greeting {
                Ok(line) => println!("< {}", String::from_utf8_lossy(&line)),
                Err(e) => return println!("No greeting: {}", e),
            }

            if let Err(e) = conn.add_write("EHLO tether.example\r\n", |_, _| {}) {
                return println!("Cannot queue command: {}", e);
            }

            // Multi-line replies end with a line whose code has a space after it.
            conn.add_read(Termination::delimiter("\r\n"), print_reply);
        });
    });

    if let Err(e) = client.request(request) {
        println!("Invalid request: {}", e);
        return;
    }

    event_loop.run().unwrap();
}

fn print_reply(result: tether::Completion, conn: tether::Connection) {
    let line = match result {
        Ok(line) => line,
        Err(e) => return println!("Exchange failed: {}", e),
    };

    println!("< {}", String::from_utf8_lossy(&line));

    if line.get(3) == Some(&b'-') {
        conn.add_read(Termination::delimiter("\r\n"), print_reply);
        return;
    }

    if let Err(e) = conn.add_write("QUIT\r\n", |_, _| {}) {
        return println!("Cannot queue command: {}", e);
    }
    conn.add_read(Termination::delimiter("\r\n"), |bye, conn| {
        if let Ok(line) = bye {
            println!("< {}", String::from_utf8_lossy(&line));
        }
        conn.close();
    });
}
