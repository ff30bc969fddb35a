// matcher.rs - wildcard matching
//
// ts6-pseudoserver - TS6 pseudo-server
// Copyright (C) 2022  Mateusz Szpakowski
//
// This library is free software; you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public
// License as published by the Free Software Foundation; either
// version 2.1 of the License, or (at your option) any later version.
//
// This library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this library; if not, write to the Free Software
// Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA  02110-1301  USA

/// Match subject against pattern where '*' matches any sequence and '?' matches
/// exactly one character. Matching is anchored. If ignore_case is true then
/// letters are compared case-insensitively.
pub(crate) fn match_wildcard(pattern: &str, subject: &str, ignore_case: bool) -> bool {
    let fold = |c: char| if ignore_case { c.to_ascii_lowercase() } else { c };
    let pattern = pattern.chars().map(fold).collect::<Vec<_>>();
    let subject = subject.chars().map(fold).collect::<Vec<_>>();
    let (mut p, mut s) = (0, 0);
    // last '*' in pattern and subject position where it stopped consuming
    let mut star: Option<(usize, usize)> = None;
    while s < subject.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, s));
                p += 1;
            }
            Some(c) if *c == '?' || *c == subject[s] => {
                p += 1;
                s += 1;
            }
            _ => match star {
                // let last '*' consume one more character
                Some((star_p, star_s)) => {
                    star = Some((star_p, star_s + 1));
                    p = star_p + 1;
                    s = star_s + 1;
                }
                None => return false,
            }
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}
