use rand::{
    Rng,
    thread_rng,
    distributions::Alphanumeric
};

use std::iter;


pub fn random_alphanum(length: usize) -> String {
    let mut rng = thread_rng();
    let chars: String = iter::repeat(())
        .map(|()| rng.sample(Alphanumeric))
        .map(char::from)
        .take(length)
        .collect();
    chars
}

// Keeps rolling until `taken` says the id is free.
pub fn generate_id<F>(prefix: &str, count: usize, taken: F) -> String
    where F: Fn(&str) -> bool
{
    let mut new_id = format!("{}_{}", prefix, random_alphanum(count));
    while taken(&new_id) {
        new_id = format!("{}_{}", prefix, random_alphanum(count));
    }
    new_id
}

pub fn ensure_crlf(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 2);
    let mut last = '\0';
    for c in input.chars() {
        if c == '\n' && last != '\r' {
            out.push('\r');
        }
        out.push(c);
        last = c;
    }
    out
}
