// src/project/scaffold.rs
use super::{GeneratedFile, ENTRY_PAGE_PATH, GLOBAL_STYLESHEET_PATH};
use std::collections::HashMap;

/// Overlays `generated` onto `scaffold`, keyed by path.
///
/// Scaffold paths keep their position; generated content wins on conflict and
/// paths new to the scaffold are appended in their original order.
pub fn merge_with_scaffold(
    scaffold: &[GeneratedFile],
    generated: &[GeneratedFile],
) -> Vec<GeneratedFile> {
    let mut merged: Vec<GeneratedFile> = Vec::with_capacity(scaffold.len() + generated.len());
    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(merged.capacity());

    for file in scaffold.iter().chain(generated) {
        match positions.get(file.path.as_str()) {
            Some(&position) => merged[position] = file.clone(),
            None => {
                positions.insert(file.path.as_str(), merged.len());
                merged.push(file.clone());
            }
        }
    }

    merged
}

/// Minimal runnable Next.js project used under every generation.
pub fn default_scaffold() -> Vec<GeneratedFile> {
    vec![
        GeneratedFile::new("package.json", PACKAGE_JSON),
        GeneratedFile::new("tsconfig.json", TSCONFIG_JSON),
        GeneratedFile::new("next.config.ts", NEXT_CONFIG),
        GeneratedFile::new("postcss.config.mjs", POSTCSS_CONFIG),
        GeneratedFile::new("tailwind.config.ts", TAILWIND_CONFIG),
        GeneratedFile::new("app/layout.tsx", LAYOUT_TSX),
        GeneratedFile::new(GLOBAL_STYLESHEET_PATH, GLOBALS_CSS),
        GeneratedFile::new(ENTRY_PAGE_PATH, PAGE_TSX),
    ]
}

const PACKAGE_JSON: &str = r#"{
  "name": "my-next-app",
  "version": "0.1.0",
  "private": true,
  "scripts": {
    "dev": "next dev",
    "build": "next build",
    "start": "next start",
    "lint": "next lint"
  },
  "dependencies": {
    "next": "^14.0.0",
    "react": "^18.2.0",
    "react-dom": "^18.2.0",
    "tailwindcss": "^3.3.0",
    "typescript": "^5.0.0",
    "autoprefixer": "^10.0.0",
    "postcss": "^8.0.0"
  },
  "devDependencies": {
    "@types/node": "^20",
    "@types/react": "^18",
    "@types/react-dom": "^18",
    "eslint": "^8",
    "eslint-config-next": "14.0.0"
  }
}"#;

const TSCONFIG_JSON: &str = r#"{
  "compilerOptions": {
    "target": "es5",
    "lib": ["dom", "dom.iterable", "esnext"],
    "allowJs": true,
    "skipLibCheck": true,
    "strict": true,
    "forceConsistentCasingInFileNames": true,
    "noEmit": true,
    "esModuleInterop": true,
    "module": "esnext",
    "moduleResolution": "node",
    "resolveJsonModule": true,
    "isolatedModules": true,
    "jsx": "preserve",
    "incremental": true,
    "paths": {
      "@/*": ["./*"]
    }
  },
  "include": ["next-env.d.ts", "**/*.ts", "**/*.tsx", ".next/types/**/*.ts"],
  "exclude": ["node_modules"]
}"#;

const NEXT_CONFIG: &str = r#"/** @type {import('next').NextConfig} */
const nextConfig = {};
module.exports = nextConfig;"#;

const POSTCSS_CONFIG: &str = r#"/** @type {import('postcss-load-config').Config} */
const config = {
  plugins: {
    tailwindcss: {},
    autoprefixer: {},
  },
};
export default config;"#;

const TAILWIND_CONFIG: &str = r#"import type { Config } from 'tailwindcss';

const config: Config = {
  content: [
    './pages/**/*.{js,ts,jsx,tsx,mdx}',
    './components/**/*.{js,ts,jsx,tsx,mdx}',
    './app/**/*.{js,ts,jsx,tsx,mdx}',
  ],
  theme: {
    extend: {
      backgroundImage: {
        'gradient-radial': 'radial-gradient(var(--tw-gradient-stops))',
        'gradient-conic':
          'conic-gradient(from 180deg at 50% 50%, var(--tw-gradient-stops))',
      },
    },
  },
  plugins: [],
};
export default config;"#;

const LAYOUT_TSX: &str = r#"import './globals.css';
import type { Metadata } from 'next';
import { Inter } from 'next/font/google';

const inter = Inter({ subsets: ['latin'] });

export const metadata: Metadata = {
  title: 'Generated by Libelula',
  description: 'Generated by Libelula AI',
};

export default function RootLayout({ children }: { children: React.ReactNode }) {
  return (
    <html lang="en">
      <body className={inter.className}>{children}</body>
    </html>
  );
}"#;

const GLOBALS_CSS: &str = r#"@tailwind base;
@tailwind components;
@tailwind utilities;

:root {
  --foreground-rgb: 0, 0, 0;
  --background-start-rgb: 214, 219, 220;
  --background-end-rgb: 255, 255, 255;
}

@media (prefers-color-scheme: dark) {
  :root {
    --foreground-rgb: 255, 255, 255;
    --background-start-rgb: 0, 0, 0;
    --background-end-rgb: 0, 0, 0;
  }
}

body {
  color: rgb(var(--foreground-rgb));
  background: linear-gradient(to bottom, transparent, rgb(var(--background-end-rgb))) rgb(var(--background-start-rgb));
}"#;

const PAGE_TSX: &str = r#"'use client';
import React from 'react';

export default function Home() {
  return (
    <main className="flex min-h-screen flex-col items-center justify-between p-24">
      <h1 className="text-4xl font-bold text-center">Hello Next.js!</h1>
      <p className="text-lg text-center mt-4">This Next.js project was generated by AI.</p>
    </main>
  );
}"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{find_file, validate_file_paths};

    fn paths(files: &[GeneratedFile]) -> Vec<&str> {
        files.iter().map(|f| f.path.as_str()).collect()
    }

    #[test]
    fn empty_generation_is_identity() {
        let scaffold = default_scaffold();
        assert_eq!(merge_with_scaffold(&scaffold, &[]), scaffold);
    }

    #[test]
    fn partial_generation_keeps_untouched_scaffold_files() {
        let scaffold = vec![
            GeneratedFile::new("package.json", "{}"),
            GeneratedFile::new("app/page.tsx", "default page"),
            GeneratedFile::new("app/globals.css", "default css"),
        ];
        let generated = vec![GeneratedFile::new("app/page.tsx", "X")];

        let merged = merge_with_scaffold(&scaffold, &generated);

        assert_eq!(
            merged,
            vec![
                GeneratedFile::new("package.json", "{}"),
                GeneratedFile::new("app/page.tsx", "X"),
                GeneratedFile::new("app/globals.css", "default css"),
            ]
        );
    }

    #[test]
    fn generated_content_wins_and_new_paths_append_in_order() {
        let scaffold = vec![
            GeneratedFile::new("a", "scaffold a"),
            GeneratedFile::new("b", "scaffold b"),
        ];
        let generated = vec![
            GeneratedFile::new("z", "new z"),
            GeneratedFile::new("b", "generated b"),
            GeneratedFile::new("c", "new c"),
        ];

        let merged = merge_with_scaffold(&scaffold, &generated);

        assert_eq!(paths(&merged), vec!["a", "b", "z", "c"]);
        assert_eq!(find_file(&merged, "b").unwrap().content, "generated b");
        assert_eq!(find_file(&merged, "a").unwrap().content, "scaffold a");
    }

    #[test]
    fn merging_is_stable_when_repeated() {
        let scaffold = default_scaffold();
        let generated = vec![
            GeneratedFile::new(ENTRY_PAGE_PATH, "page"),
            GeneratedFile::new("app/components/Card.tsx", "card"),
        ];
        let once = merge_with_scaffold(&scaffold, &generated);
        let twice = merge_with_scaffold(&scaffold, &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn default_scaffold_is_a_valid_project() {
        let scaffold = default_scaffold();
        assert_eq!(validate_file_paths(&scaffold), Ok(()));
        assert!(find_file(&scaffold, ENTRY_PAGE_PATH).is_some());
        assert!(find_file(&scaffold, GLOBAL_STYLESHEET_PATH).is_some());
        assert!(find_file(&scaffold, "package.json").is_some());
    }
}
