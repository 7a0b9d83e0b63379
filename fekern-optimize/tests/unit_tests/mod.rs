mod calculus;
